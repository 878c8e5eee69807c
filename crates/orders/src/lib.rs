//! Orders domain module.
//!
//! An order is born complete: header, price-snapshotted lines and total are
//! assembled by [`OrderDraft`] while the ledger rows are locked, then persisted
//! in one write. There is no mutation path after that.

pub mod order;

pub use order::{Order, OrderDraft, OrderItem, OrderLineRequest, OrderStatus, validate_lines};
