//! Catalog domain module: events and the ticket types they put on sale.
//!
//! The catalog is an upstream collaborator of order placement. It validates
//! and shapes new events/ticket types; it never touches remaining stock after
//! creation.

pub mod event;

pub use event::{Event, EventPage, EventStatus, NewEvent, NewTicketType, plan_event_with_tickets};
