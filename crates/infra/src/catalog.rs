//! Catalog service: event + ticket type creation and plain reads.
//!
//! Reads return committed state without taking row locks. A price change
//! only affects orders placed afterwards; existing order lines keep their
//! snapshot.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use boxoffice_catalog::{plan_event_with_tickets, Event, EventPage, NewEvent, NewTicketType};
use boxoffice_core::{DomainError, EventId, Money, TicketTypeId};
use boxoffice_inventory::TicketType;

use crate::store::{CatalogStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("slug '{0}' is already taken")]
    SlugTaken(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for CatalogError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => CatalogError::Validation(msg),
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TicketTypeNotFound(id) => CatalogError::NotFound(format!("ticket type {id}")),
            StoreError::NotFound(msg) => CatalogError::NotFound(msg),
            StoreError::Conflict(msg) => CatalogError::Conflict(msg),
            StoreError::Duplicate(msg) | StoreError::Storage(msg) => CatalogError::Storage(msg),
        }
    }
}

/// An event together with its ticket types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventWithTicketTypes {
    #[serde(flatten)]
    pub event: Event,
    pub ticket_types: Vec<TicketType>,
}

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S> CatalogService<S>
where
    S: CatalogStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create an event and all of its ticket types, or nothing.
    #[instrument(skip(self, new_event, ticket_types), fields(slug = %new_event.slug, ticket_type_count = ticket_types.len()))]
    pub async fn create_event_with_tickets(
        &self,
        new_event: NewEvent,
        ticket_types: Vec<NewTicketType>,
    ) -> Result<EventWithTicketTypes, CatalogError> {
        let (event, ticket_types) = plan_event_with_tickets(new_event, ticket_types, Utc::now())?;

        if self.store.get_event_by_slug(&event.slug).await?.is_some() {
            return Err(CatalogError::SlugTaken(event.slug));
        }

        match self.store.create_event_with_ticket_types(&event, &ticket_types).await {
            Ok(()) => {}
            // Lost a race for the same slug.
            Err(StoreError::Duplicate(_)) => return Err(CatalogError::SlugTaken(event.slug)),
            Err(other) => return Err(other.into()),
        }

        info!(event_id = %event.id, "event created");
        Ok(EventWithTicketTypes { event, ticket_types })
    }

    pub async fn get_event(&self, id: EventId) -> Result<EventWithTicketTypes, CatalogError> {
        let event = self
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("event {id}")))?;
        self.with_ticket_types(event).await
    }

    pub async fn get_event_by_slug(&self, slug: &str) -> Result<EventWithTicketTypes, CatalogError> {
        let event = self
            .store
            .get_event_by_slug(slug)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("event '{slug}'")))?;
        self.with_ticket_types(event).await
    }

    pub async fn list_events(&self, page: EventPage) -> Result<Vec<Event>, CatalogError> {
        Ok(self.store.list_events(page).await?)
    }

    pub async fn get_ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CatalogError> {
        self.store
            .get_ticket_type(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("ticket type {id}")))
    }

    #[instrument(skip(self), fields(ticket_type_id = %id, price = %price))]
    pub async fn update_ticket_type_price(&self, id: TicketTypeId, price: Money) -> Result<TicketType, CatalogError> {
        price.ensure_price()?;
        let updated = self.store.update_ticket_type_price(id, price).await?;
        info!("ticket type price updated");
        Ok(updated)
    }

    async fn with_ticket_types(&self, event: Event) -> Result<EventWithTicketTypes, CatalogError> {
        let ticket_types = self.store.list_ticket_types(event.id).await?;
        Ok(EventWithTicketTypes { event, ticket_types })
    }
}
