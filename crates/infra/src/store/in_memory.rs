//! In-memory store backend.
//!
//! Intended for tests/dev and the default when no database is configured.
//! It still honours the full locking contract of [`InventoryTx`]:
//!
//! - every ticket type has its own async mutex; `acquire_for_update` holds it
//!   (as an owned guard inside the transaction) until commit or drop
//! - lock waits are bounded by `lock_timeout`; expiry surfaces as
//!   [`StoreError::Conflict`], which also breaks lock-order cycles
//! - decrements and orders are staged inside the transaction and published
//!   under a single write of the committed tables, so readers never observe a
//!   half-applied order
//!
//! Committed tables sit behind a `std::sync::RwLock` that is only ever taken
//! inside synchronous helpers, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

use boxoffice_catalog::{Event, EventPage};
use boxoffice_core::{EventId, Money, OrderId, TicketTypeId, UserId};
use boxoffice_inventory::TicketType;
use boxoffice_orders::Order;

use super::r#trait::{CatalogStore, InventoryStore, InventoryTx, OrderReader, StoreError};

/// Default lock-wait deadline, matching the Postgres backend's `lock_timeout`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    ticket_types: HashMap<TicketTypeId, TicketType>,
    orders: HashMap<OrderId, Order>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<TicketTypeId, Arc<RowLock<()>>>>,
    lock_timeout: Duration,
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| poisoned())
    }

    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, StoreError> {
        Ok(self.read()?.ticket_types.get(&id).cloned())
    }

    fn row_lock(&self, id: TicketTypeId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    async fn lock_row(&self, id: TicketTypeId) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = self.row_lock(id)?;
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                StoreError::Conflict(format!(
                    "lock wait on ticket type {id} exceeded {}ms",
                    self.lock_timeout.as_millis()
                ))
            })
    }

    /// Publish a transaction's decrements and orders in one step.
    ///
    /// Everything is checked before anything is written.
    fn apply(&self, locked: &HashMap<TicketTypeId, LockedRow>, orders: Vec<Order>) -> Result<(), StoreError> {
        let mut tables = self.write()?;

        for (id, row) in locked {
            let current = tables
                .ticket_types
                .get(id)
                .ok_or(StoreError::TicketTypeNotFound(*id))?;
            if current.remaining_quantity < row.decremented {
                return Err(StoreError::Storage(format!(
                    "check constraint violated: remaining_quantity of {id} would go negative"
                )));
            }
        }
        for order in &orders {
            if tables.orders.contains_key(&order.id) {
                return Err(StoreError::Duplicate(format!("order {} already exists", order.id)));
            }
        }

        for (id, row) in locked {
            if let Some(current) = tables.ticket_types.get_mut(id) {
                current.remaining_quantity -= row.decremented;
            }
        }
        for order in orders {
            tables.orders.insert(order.id, order);
        }
        Ok(())
    }
}

/// In-memory ledger, order store and catalog.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct LockedRow {
    _guard: OwnedMutexGuard<()>,
    /// Committed row as read after the lock was granted, with this
    /// transaction's decrements applied.
    row: TicketType,
    decremented: u32,
}

/// Open in-memory transaction.
///
/// Dropping it without `commit` discards the staged work and releases every
/// row lock it holds.
#[derive(Debug)]
pub struct InMemoryTx {
    shared: Arc<Shared>,
    locked: HashMap<TicketTypeId, LockedRow>,
    orders: Vec<Order>,
}

impl InMemoryTx {
    async fn locked_row(&mut self, id: TicketTypeId) -> Result<&mut LockedRow, StoreError> {
        if !self.locked.contains_key(&id) {
            if self.shared.ticket_type(id)?.is_none() {
                return Err(StoreError::TicketTypeNotFound(id));
            }

            let guard = self.shared.lock_row(id).await?;
            // Re-read under the lock: the value seen before waiting may be stale.
            let row = self
                .shared
                .ticket_type(id)?
                .ok_or(StoreError::TicketTypeNotFound(id))?;
            self.locked.insert(
                id,
                LockedRow {
                    _guard: guard,
                    row,
                    decremented: 0,
                },
            );
        }

        self.locked
            .get_mut(&id)
            .ok_or(StoreError::TicketTypeNotFound(id))
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryTx {
            shared: Arc::clone(&self.shared),
            locked: HashMap::new(),
            orders: Vec::new(),
        })
    }
}

#[async_trait]
impl InventoryTx for InMemoryTx {
    async fn acquire_for_update(&mut self, id: TicketTypeId) -> Result<TicketType, StoreError> {
        Ok(self.locked_row(id).await?.row.clone())
    }

    async fn decrement_remaining(&mut self, id: TicketTypeId, quantity: u32) -> Result<(), StoreError> {
        let locked = self.locked_row(id).await?;
        locked
            .row
            .decrement(quantity)
            .map_err(|e| StoreError::Storage(format!("check constraint violated: {e}")))?;
        locked.decremented += quantity;
        Ok(())
    }

    async fn create_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.orders.iter().any(|o| o.id == order.id) || self.shared.read()?.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(format!("order {} already exists", order.id)));
        }
        for item in &order.items {
            if self.shared.ticket_type(item.ticket_type_id)?.is_none() {
                return Err(StoreError::Storage(format!(
                    "foreign key violated: order item references unknown ticket type {}",
                    item.ticket_type_id
                )));
            }
        }
        self.orders.push(order.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryTx {
            shared,
            locked,
            orders,
        } = self;

        let order_count = orders.len();
        shared.apply(&locked, orders)?;
        debug!(rows = locked.len(), orders = order_count, "in-memory transaction committed");

        // Row locks are released only after the new values are visible.
        drop(locked);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        debug!(rows = self.locked.len(), "in-memory transaction rolled back");
        drop(self);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_event_with_ticket_types(
        &self,
        event: &Event,
        ticket_types: &[TicketType],
    ) -> Result<(), StoreError> {
        let mut tables = self.shared.write()?;

        if tables.events.values().any(|e| e.slug == event.slug) {
            return Err(StoreError::Duplicate(format!("slug '{}' already exists", event.slug)));
        }
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::Duplicate(format!("event {} already exists", event.id)));
        }
        if let Some(tt) = ticket_types.iter().find(|tt| tables.ticket_types.contains_key(&tt.id)) {
            return Err(StoreError::Duplicate(format!("ticket type {} already exists", tt.id)));
        }

        tables.events.insert(event.id, event.clone());
        for tt in ticket_types {
            tables.ticket_types.insert(tt.id, tt.clone());
        }
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.shared.read()?.events.get(&id).cloned())
    }

    async fn get_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError> {
        Ok(self.shared.read()?.events.values().find(|e| e.slug == slug).cloned())
    }

    async fn list_events(&self, page: EventPage) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self.shared.read()?.events.values().cloned().collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(events
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn get_ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, StoreError> {
        self.shared.ticket_type(id)
    }

    async fn list_ticket_types(&self, event_id: EventId) -> Result<Vec<TicketType>, StoreError> {
        let mut tts: Vec<TicketType> = self
            .shared
            .read()?
            .ticket_types
            .values()
            .filter(|tt| tt.event_id == event_id)
            .cloned()
            .collect();
        tts.sort_by_key(|tt| tt.id);
        Ok(tts)
    }

    async fn update_ticket_type_price(
        &self,
        id: TicketTypeId,
        price: Money,
    ) -> Result<TicketType, StoreError> {
        if self.shared.ticket_type(id)?.is_none() {
            return Err(StoreError::TicketTypeNotFound(id));
        }

        // Same row lock as order placement: waits for in-flight allocations.
        let _guard = self.shared.lock_row(id).await?;
        let mut tables = self.shared.write()?;
        let row = tables
            .ticket_types
            .get_mut(&id)
            .ok_or(StoreError::TicketTypeNotFound(id))?;
        row.price = price;
        Ok(row.clone())
    }
}

#[async_trait]
impl OrderReader for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.shared.read()?.orders.get(&id).cloned())
    }

    async fn list_orders_for_buyer(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .shared
            .read()?
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}
