//! Storage boundary for the inventory ledger, order store and catalog.
//!
//! Order placement only ever sees the [`InventoryStore`] / [`InventoryTx`]
//! capability; the concrete backend is picked at wiring time.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use r#trait::{CatalogStore, InventoryStore, InventoryTx, OrderReader, StoreError};
