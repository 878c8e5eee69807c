//! Order allocation: turn a buyer's requested lines into a committed order
//! while decrementing the inventory ledger, or change nothing at all.
//!
//! ## Algorithm
//!
//! Inside one store transaction, for each line in request order:
//!
//! 1. lock the ticket type row (`acquire_for_update`) and read it
//! 2. reject the whole order if `remaining < quantity`
//! 3. decrement `remaining` relatively
//! 4. append an order item carrying the row's current price
//!
//! Then the order header and items are stored and the transaction committed.
//! Stock checks only ever happen on a locked row, so two buyers racing for the
//! last ticket serialize on that row and exactly one of them wins.
//!
//! ## Failure Handling
//!
//! Any failure rolls the transaction back explicitly. If the allocation future
//! is dropped instead (panic unwinding, task cancellation, client disconnect),
//! the transaction value is dropped with it and the backend discards the
//! staged work and releases its locks, so no row stays locked and no partial
//! decrement survives.
//!
//! ## Lock Ordering
//!
//! Rows are locked in request order. Two orders touching the same ticket types
//! in opposite orders can deadlock; the backend breaks that with a lock-wait
//! deadline (or deadlock detection) and the loser gets
//! [`AllocationError::TransientConflict`]. The allocator never retries by
//! itself; see [`crate::retry`].

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument, warn, Span};

use boxoffice_core::{DomainError, TicketTypeId, UserId};
use boxoffice_inventory::StockShortfall;
use boxoffice_orders::{validate_lines, Order, OrderDraft, OrderLineRequest};

use crate::retry::Retryable;
use crate::store::{InventoryStore, InventoryTx, StoreError};

/// Why an order could not be placed.
///
/// Every variant means nothing was committed: no stock was consumed and no
/// order exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The request can never succeed as written (no lines, zero quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ticket type not found: {0}")]
    NotFound(TicketTypeId),

    #[error("insufficient stock for '{ticket_type_name}': {remaining} remaining, {requested} requested")]
    InsufficientStock {
        ticket_type_name: String,
        remaining: u32,
        requested: u32,
    },

    /// Lock wait expired or the transaction was aborted by a deadlock; the
    /// whole attempt may be retried.
    #[error("transient conflict: {0}")]
    TransientConflict(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl AllocationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::TransientConflict(_))
    }
}

impl Retryable for AllocationError {
    fn is_retryable(&self) -> bool {
        AllocationError::is_retryable(self)
    }
}

impl From<StoreError> for AllocationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TicketTypeNotFound(id) => AllocationError::NotFound(id),
            StoreError::Conflict(msg) => AllocationError::TransientConflict(msg),
            StoreError::NotFound(msg) | StoreError::Duplicate(msg) | StoreError::Storage(msg) => {
                AllocationError::PersistenceFailure(msg)
            }
        }
    }
}

impl From<StockShortfall> for AllocationError {
    fn from(value: StockShortfall) -> Self {
        AllocationError::InsufficientStock {
            ticket_type_name: value.ticket_type_name,
            remaining: value.remaining,
            requested: value.requested,
        }
    }
}

impl From<DomainError> for AllocationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AllocationError::Validation(msg),
            // Only reachable through amount overflow on absurd quantities.
            DomainError::InvariantViolation(msg) => AllocationError::Validation(msg),
        }
    }
}

/// Places orders against an [`InventoryStore`].
///
/// Holds no state of its own; clone freely and call concurrently.
#[derive(Debug, Clone)]
pub struct OrderAllocator<S> {
    store: S,
}

impl<S> OrderAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> OrderAllocator<S>
where
    S: InventoryStore,
{
    /// Place an order for `buyer_id`, all or nothing.
    ///
    /// On success the returned order is committed, `Pending`, its items are
    /// in request order with prices snapshotted, and every line's quantity has
    /// been taken from stock.
    #[instrument(
        skip(self, lines),
        fields(buyer_id = %buyer_id, line_count = lines.len(), order_id = tracing::field::Empty)
    )]
    pub async fn place_order(
        &self,
        buyer_id: UserId,
        lines: &[OrderLineRequest],
    ) -> Result<Order, AllocationError> {
        let result = self.try_place_order(buyer_id, lines).await;

        match &result {
            Ok(order) => {
                Span::current().record("order_id", tracing::field::display(order.id));
                info!(order_id = %order.id, total = %order.total_amount, "order placed");
            }
            Err(err @ AllocationError::PersistenceFailure(_)) => {
                error!(error = %err, "order placement failed");
            }
            Err(err) => {
                warn!(error = %err, "order rejected");
            }
        }
        result
    }

    async fn try_place_order(
        &self,
        buyer_id: UserId,
        lines: &[OrderLineRequest],
    ) -> Result<Order, AllocationError> {
        validate_lines(lines)?;

        let mut tx = self.store.begin().await?;

        let order = match allocate(&mut tx, buyer_id, lines).await {
            Ok(order) => order,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The failed transaction is discarded either way.
                    warn!(error = %rollback_err, "rollback failed");
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        Ok(order)
    }
}

async fn allocate<T>(tx: &mut T, buyer_id: UserId, lines: &[OrderLineRequest]) -> Result<Order, AllocationError>
where
    T: InventoryTx,
{
    let mut draft = OrderDraft::new(buyer_id);

    for line in lines {
        let ticket_type = tx.acquire_for_update(line.ticket_type_id).await?;
        ticket_type.ensure_available(line.quantity)?;

        tx.decrement_remaining(line.ticket_type_id, line.quantity).await?;
        draft.add_line(&ticket_type, line.quantity)?;
    }

    let order = draft.finish(Utc::now())?;
    tx.create_order(&order).await?;
    Ok(order)
}
