//! Postgres-backed store implementation.
//!
//! Row locks are real row locks: `acquire_for_update` issues
//! `SELECT ... FOR UPDATE` inside the transaction, and the decrement is a single
//! relative `UPDATE`. Every transaction sets `lock_timeout` locally so that a
//! blocked lock wait becomes an error instead of hanging.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (deadlock detected) | `40P01` | `Conflict` | Two allocations locked rows in opposite order |
//! | Database (lock not available) | `55P03` | `Conflict` | `lock_timeout` expired while waiting for a row |
//! | Database (serialization failure) | `40001` | `Conflict` | Transaction aborted by the server |
//! | Database (query canceled) | `57014` | `Conflict` | Statement timeout |
//! | Database (unique violation) | `23505` | `Duplicate` | Slug or id already taken |
//! | Database (check constraint violation) | `23514` | `Storage` | Stock bounds violated (lock discipline broken) |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / PoolTimedOut | N/A | `Storage` | Connection pool unavailable |
//! | Other | N/A | `Storage` | Network errors, decode failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresStore` is `Send + Sync` and cheap to clone; all operations go
//! through the SQLx connection pool.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use boxoffice_catalog::{Event, EventPage, EventStatus};
use boxoffice_core::{EventId, Money, OrderId, OrderItemId, TicketTypeId, UserId};
use boxoffice_inventory::TicketType;
use boxoffice_orders::{Order, OrderItem, OrderStatus};

use super::r#trait::{CatalogStore, InventoryStore, InventoryTx, OrderReader, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_boxoffice.sql");

/// Postgres ledger, order store and catalog.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a connection pool against `url`.
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Start a transaction whose lock waits give up after `lock_timeout`.
    async fn begin_with_lock_timeout(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(tx)
    }

    /// Create the schema if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItemRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, ticket_type_id, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        rows.iter()
            .map(|row| OrderItemRow::from_row(row).map_err(|e| decode_error("order item", e)))
            .collect()
    }
}

/// Open Postgres transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryStore for PostgresStore {
    type Tx = PostgresTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(PostgresTx {
            tx: self.begin_with_lock_timeout().await?,
        })
    }
}

#[async_trait]
impl InventoryTx for PostgresTx {
    #[instrument(skip(self), fields(ticket_type_id = %id), err)]
    async fn acquire_for_update(&mut self, id: TicketTypeId) -> Result<TicketType, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_id, name, price, initial_quantity, remaining_quantity
            FROM ticket_types
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("acquire_for_update", e))?
        .ok_or(StoreError::TicketTypeNotFound(id))?;

        TicketTypeRow::from_row(&row)
            .map_err(|e| decode_error("ticket type", e))?
            .try_into()
    }

    #[instrument(skip(self), fields(ticket_type_id = %id), err)]
    async fn decrement_remaining(&mut self, id: TicketTypeId, quantity: u32) -> Result<(), StoreError> {
        let quantity = to_db_quantity(quantity)?;

        let result = sqlx::query(
            r#"
            UPDATE ticket_types
            SET remaining_quantity = remaining_quantity - $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_remaining", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TicketTypeNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, item_count = order.items.len()), err)]
    async fn create_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if order.items.is_empty() {
            return Err(StoreError::Storage(format!("order {} has no items", order.id)));
        }
        let quantities = order
            .items
            .iter()
            .map(|item| to_db_quantity(item.quantity))
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount.amount())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO order_items (id, order_id, line_no, ticket_type_id, quantity, price) ",
        );
        qb.push_values(order.items.iter().zip(quantities).enumerate(), |mut b, (line_no, (item, qty))| {
            b.push_bind(*item.id.as_uuid());
            b.push_bind(*item.order_id.as_uuid());
            b.push_bind(line_no as i32);
            b.push_bind(*item.ticket_type_id.as_uuid());
            b.push_bind(qty);
            b.push_bind(item.unit_price.amount());
        });
        qb.build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_items", e))?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, event, ticket_types), fields(event_id = %event.id, slug = %event.slug), err)]
    async fn create_event_with_ticket_types(
        &self,
        event: &Event,
        ticket_types: &[TicketType],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO events (
                id, name, slug, location, banner_url,
                start_time, end_time, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.location)
        .bind(&event.banner_url)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_event", e))?;

        if !ticket_types.is_empty() {
            let quantities = ticket_types
                .iter()
                .map(|tt| Ok((to_db_quantity(tt.initial_quantity)?, to_db_quantity(tt.remaining_quantity)?)))
                .collect::<Result<Vec<_>, StoreError>>()?;

            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO ticket_types (id, event_id, name, price, initial_quantity, remaining_quantity) ",
            );
            qb.push_values(ticket_types.iter().zip(quantities), |mut b, (tt, (initial, remaining))| {
                b.push_bind(*tt.id.as_uuid());
                b.push_bind(*tt.event_id.as_uuid());
                b.push_bind(tt.name.clone());
                b.push_bind(tt.price.amount());
                b.push_bind(initial);
                b.push_bind(remaining);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_ticket_types", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("{EVENT_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_event", e))?;

        row.map(|r| decode_event(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("{EVENT_SELECT} WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_event_by_slug", e))?;

        row.map(|r| decode_event(&r)).transpose()
    }

    #[instrument(
        skip(self),
        fields(limit = page.limit, offset = page.offset, event_count = tracing::field::Empty),
        err
    )]
    async fn list_events(&self, page: EventPage) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(&format!(
            "{EVENT_SELECT} ORDER BY start_time ASC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;

        let span = Span::current();
        span.record("event_count", rows.len());
        rows.iter().map(decode_event).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, StoreError> {
        let row = sqlx::query(&format!("{TICKET_TYPE_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_ticket_type", e))?;

        row.map(|r| decode_ticket_type(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_ticket_types(&self, event_id: EventId) -> Result<Vec<TicketType>, StoreError> {
        let rows = sqlx::query(&format!("{TICKET_TYPE_SELECT} WHERE event_id = $1 ORDER BY id ASC"))
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_ticket_types", e))?;

        rows.iter().map(decode_ticket_type).collect()
    }

    #[instrument(skip(self), fields(price = %price), err)]
    async fn update_ticket_type_price(
        &self,
        id: TicketTypeId,
        price: Money,
    ) -> Result<TicketType, StoreError> {
        // Waits behind in-flight allocations holding the row, up to lock_timeout.
        let mut tx = self.begin_with_lock_timeout().await?;

        let row = sqlx::query(
            r#"
            UPDATE ticket_types
            SET price = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, event_id, name, price, initial_quantity, remaining_quantity
            "#,
        )
        .bind(id.as_uuid())
        .bind(price.amount())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_ticket_type_price", e))?
        .ok_or(StoreError::TicketTypeNotFound(id))?;
        let updated = decode_ticket_type(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }
}

#[async_trait]
impl OrderReader for PostgresStore {
    #[instrument(skip(self), err)]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{ORDER_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = OrderRow::from_row(&row).map_err(|e| decode_error("order", e))?;
        let items = self.load_items(&[header.id]).await?;
        Ok(Some(assemble_order(header, items)?))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_orders_for_buyer(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            "{ORDER_SELECT} WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders_for_buyer", e))?;

        let headers = rows
            .iter()
            .map(|r| OrderRow::from_row(r).map_err(|e| decode_error("order", e)))
            .collect::<Result<Vec<_>, _>>()?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut items = self.load_items(&ids).await?;

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let (mine, rest): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.order_id == header.id);
            items = rest;
            orders.push(assemble_order(header, mine)?);
        }
        Ok(orders)
    }
}

const EVENT_SELECT: &str = r#"
    SELECT id, name, slug, location, banner_url, start_time, end_time, status, created_at, updated_at
    FROM events
"#;

const TICKET_TYPE_SELECT: &str = r#"
    SELECT id, event_id, name, price, initial_quantity, remaining_quantity
    FROM ticket_types
"#;

const ORDER_SELECT: &str = r#"
    SELECT id, user_id, total_amount, status, created_at, updated_at
    FROM orders
"#;

fn to_db_quantity(quantity: u32) -> Result<i32, StoreError> {
    i32::try_from(quantity).map_err(|_| StoreError::Storage(format!("quantity {quantity} out of range")))
}

fn from_db_quantity(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Storage(format!("negative {column}: {value}")))
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to decode {what} row: {err}"))
}

fn decode_event(row: &PgRow) -> Result<Event, StoreError> {
    EventRow::from_row(row)
        .map_err(|e| decode_error("event", e))?
        .try_into()
}

fn decode_ticket_type(row: &PgRow) -> Result<TicketType, StoreError> {
    TicketTypeRow::from_row(row)
        .map_err(|e| decode_error("ticket type", e))?
        .try_into()
}

fn assemble_order(header: OrderRow, items: Vec<OrderItemRow>) -> Result<Order, StoreError> {
    let status = header
        .status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    let items = items
        .into_iter()
        .map(|i| {
            Ok(OrderItem {
                id: OrderItemId::from_uuid(i.id),
                order_id: OrderId::from_uuid(i.order_id),
                ticket_type_id: TicketTypeId::from_uuid(i.ticket_type_id),
                quantity: from_db_quantity("quantity", i.quantity)?,
                unit_price: Money::new(i.price),
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Order {
        id: OrderId::from_uuid(header.id),
        user_id: UserId::from_uuid(header.user_id),
        total_amount: Money::new(header.total_amount),
        status,
        created_at: header.created_at,
        updated_at: header.updated_at,
        items,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // deadlock_detected, lock_not_available, serialization_failure, query_canceled
                Some("40P01") | Some("55P03") | Some("40001") | Some("57014") => StoreError::Conflict(msg),
                Some("23505") => StoreError::Duplicate(msg),
                // check_violation on remaining_quantity: should be unreachable under row locks
                Some("23514") => StoreError::Storage(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::Storage(format!("connection pool timed out in {operation}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct TicketTypeRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    price: Decimal,
    initial_quantity: i32,
    remaining_quantity: i32,
}

impl<'r> FromRow<'r, PgRow> for TicketTypeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TicketTypeRow {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            initial_quantity: row.try_get("initial_quantity")?,
            remaining_quantity: row.try_get("remaining_quantity")?,
        })
    }
}

impl TryFrom<TicketTypeRow> for TicketType {
    type Error = StoreError;

    fn try_from(row: TicketTypeRow) -> Result<Self, Self::Error> {
        Ok(TicketType {
            id: TicketTypeId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            name: row.name,
            price: Money::new(row.price),
            initial_quantity: from_db_quantity("initial_quantity", row.initial_quantity)?,
            remaining_quantity: from_db_quantity("remaining_quantity", row.remaining_quantity)?,
        })
    }
}

#[derive(Debug)]
struct EventRow {
    id: Uuid,
    name: String,
    slug: String,
    location: String,
    banner_url: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            location: row.try_get("location")?,
            banner_url: row.try_get("banner_url")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: EventId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            location: row.location,
            banner_url: row.banner_url,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row
                .status
                .parse::<EventStatus>()
                .map_err(|e| StoreError::Storage(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            total_amount: row.try_get("total_amount")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    ticket_type_id: Uuid,
    quantity: i32,
    price: Decimal,
}

impl<'r> FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            ticket_type_id: row.try_get("ticket_type_id")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
        })
    }
}
