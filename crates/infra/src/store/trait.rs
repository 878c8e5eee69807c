use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use boxoffice_catalog::{Event, EventPage};
use boxoffice_core::{EventId, Money, OrderId, TicketTypeId, UserId};
use boxoffice_inventory::TicketType;
use boxoffice_orders::Order;

/// Storage operation error.
///
/// These are **infrastructure errors**. Business outcomes such as "not enough
/// stock" are decided by the caller on the locked row and never originate here.
///
/// ## Error Categories
///
/// - **TicketTypeNotFound**: a lock or decrement targeted a missing ledger row
/// - **NotFound**: any other missing record (event, order)
/// - **Duplicate**: a uniqueness constraint rejected a write (slug, id)
/// - **Conflict**: lock-wait timeout, deadlock abort or serialization failure;
///   the whole transaction is gone and may be retried
/// - **Storage**: everything else (connection, constraint, decode failures)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket type not found: {0}")]
    TicketTypeNotFound(TicketTypeId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("transient conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Ledger + order store capability used by order placement.
///
/// ## Transactions
///
/// Everything happens inside an [`InventoryTx`] obtained from [`begin`]. A
/// transaction is a scoped resource: `commit` publishes its effects, while
/// `rollback` *or simply dropping it* (early return, `?`, panic unwinding,
/// future cancellation) discards every staged decrement and order and releases
/// every row lock it holds.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - make `acquire_for_update` exclusive per ticket type until the holder ends
/// - make it re-entrant within one transaction (the same ticket type may be
///   locked again by a later line)
/// - apply `decrement_remaining` relative to the authoritative value
/// - make committed decrements and the order visible atomically
/// - report lock-wait timeouts and deadlocks as [`StoreError::Conflict`]
///
/// [`begin`]: InventoryStore::begin
#[async_trait]
pub trait InventoryStore: Send + Sync {
    type Tx: InventoryTx;

    /// Open a transaction scoping one order placement.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One open ledger transaction.
#[async_trait]
pub trait InventoryTx: Send {
    /// Lock the ticket type row for the rest of this transaction and return its
    /// current committed state (plus this transaction's own decrements).
    async fn acquire_for_update(&mut self, id: TicketTypeId) -> Result<TicketType, StoreError>;

    /// `remaining_quantity = remaining_quantity - quantity`, as one relative update.
    async fn decrement_remaining(&mut self, id: TicketTypeId, quantity: u32) -> Result<(), StoreError>;

    /// Stage the order header and all of its items as one unit.
    async fn create_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

/// Catalog persistence: events and ticket type definitions.
///
/// Reads here are plain reads of committed state; they never take a row lock
/// and never observe an uncommitted decrement.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Store an event and all of its ticket types atomically.
    ///
    /// Fails with [`StoreError::Duplicate`] if the slug is already taken.
    async fn create_event_with_ticket_types(
        &self,
        event: &Event,
        ticket_types: &[TicketType],
    ) -> Result<(), StoreError>;

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    async fn get_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError>;

    /// Events ordered by start time, then id.
    async fn list_events(&self, page: EventPage) -> Result<Vec<Event>, StoreError>;

    async fn get_ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, StoreError>;

    async fn list_ticket_types(&self, event_id: EventId) -> Result<Vec<TicketType>, StoreError>;

    /// Change the price for future orders. Existing order lines keep their snapshot.
    async fn update_ticket_type_price(
        &self,
        id: TicketTypeId,
        price: Money,
    ) -> Result<TicketType, StoreError>;
}

/// Read access to committed orders.
#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// A buyer's orders, newest first.
    async fn list_orders_for_buyer(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;
}
