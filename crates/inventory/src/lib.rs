//! Inventory ledger domain module.
//!
//! A ticket type is one row of the ledger: a price plus a finite stock that is
//! only ever decremented by order placement. This crate holds the row and its
//! stock rules as deterministic domain logic (no IO, no locking, no storage).

pub mod ticket_type;

pub use ticket_type::{StockShortfall, TicketType};
