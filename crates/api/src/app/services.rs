//! Backend wiring: one allocator + catalog + order reader over the configured store.

use tracing::info;

use boxoffice_catalog::{Event, EventPage, NewEvent, NewTicketType};
use boxoffice_core::{EventId, Money, OrderId, TicketTypeId, UserId};
use boxoffice_infra::store::{
    CatalogStore, InMemoryStore, InventoryStore, OrderReader, PostgresStore, StoreError,
};
use boxoffice_infra::{
    retry_transient, AllocationError, AppConfig, CatalogError, CatalogService, EventWithTicketTypes,
    OrderAllocator, RetryPolicy,
};
use boxoffice_inventory::TicketType;
use boxoffice_orders::{Order, OrderLineRequest};

/// Services over one concrete store.
#[derive(Debug, Clone)]
pub struct Backend<S> {
    store: S,
    allocator: OrderAllocator<S>,
    catalog: CatalogService<S>,
    retry: RetryPolicy,
}

impl<S> Backend<S>
where
    S: InventoryStore + CatalogStore + OrderReader + Clone,
{
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            allocator: OrderAllocator::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            store,
            retry,
        }
    }

    async fn place_order(&self, buyer: UserId, lines: &[OrderLineRequest]) -> Result<Order, AllocationError> {
        retry_transient(&self.retry, || self.allocator.place_order(buyer, lines)).await
    }

    async fn order_for_buyer(&self, buyer: UserId, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self
            .store
            .get_order(id)
            .await?
            .filter(|order| order.user_id == buyer))
    }
}

/// Application services, selected at startup.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory(Backend<InMemoryStore>),
    Postgres(Backend<PostgresStore>),
}

macro_rules! with_backend {
    ($services:expr, $backend:ident => $body:expr) => {
        match $services {
            AppServices::InMemory($backend) => $body,
            AppServices::Postgres($backend) => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(store: InMemoryStore, retry: RetryPolicy) -> Self {
        AppServices::InMemory(Backend::new(store, retry))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            AppServices::InMemory(_) => "in_memory",
            AppServices::Postgres(_) => "postgres",
        }
    }

    pub async fn place_order(&self, buyer: UserId, lines: &[OrderLineRequest]) -> Result<Order, AllocationError> {
        with_backend!(self, b => b.place_order(buyer, lines).await)
    }

    /// The order if it exists and belongs to `buyer`.
    pub async fn get_order(&self, buyer: UserId, id: OrderId) -> Result<Option<Order>, StoreError> {
        with_backend!(self, b => b.order_for_buyer(buyer, id).await)
    }

    pub async fn list_orders(&self, buyer: UserId) -> Result<Vec<Order>, StoreError> {
        with_backend!(self, b => b.store.list_orders_for_buyer(buyer).await)
    }

    pub async fn create_event(
        &self,
        event: NewEvent,
        ticket_types: Vec<NewTicketType>,
    ) -> Result<EventWithTicketTypes, CatalogError> {
        with_backend!(self, b => b.catalog.create_event_with_tickets(event, ticket_types).await)
    }

    pub async fn get_event(&self, id: EventId) -> Result<EventWithTicketTypes, CatalogError> {
        with_backend!(self, b => b.catalog.get_event(id).await)
    }

    pub async fn get_event_by_slug(&self, slug: &str) -> Result<EventWithTicketTypes, CatalogError> {
        with_backend!(self, b => b.catalog.get_event_by_slug(slug).await)
    }

    pub async fn list_events(&self, page: EventPage) -> Result<Vec<Event>, CatalogError> {
        with_backend!(self, b => b.catalog.list_events(page).await)
    }

    pub async fn get_ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CatalogError> {
        with_backend!(self, b => b.catalog.get_ticket_type(id).await)
    }

    pub async fn update_ticket_type_price(&self, id: TicketTypeId, price: Money) -> Result<TicketType, CatalogError> {
        with_backend!(self, b => b.catalog.update_ticket_type_price(id, price).await)
    }
}

/// Build services from configuration: Postgres when a database URL is set,
/// in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let retry = config.retry_policy();

    let services = match &config.database {
        Some(db) => {
            let store = PostgresStore::connect(&db.url, db.max_connections, config.lock_timeout).await?;
            store.migrate().await?;
            AppServices::Postgres(Backend::new(store, retry))
        }
        None => AppServices::in_memory(InMemoryStore::with_lock_timeout(config.lock_timeout), retry),
    };

    info!(backend = services.backend_name(), "services initialised");
    Ok(services)
}
