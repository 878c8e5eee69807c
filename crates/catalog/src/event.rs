use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{DomainError, DomainResult, Entity, EventId, Money, TicketTypeId};
use boxoffice_inventory::TicketType;

/// Event lifecycle status.
///
/// Events are created `Draft`. Order placement does not consult this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Ended,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Published => "PUBLISHED",
            EventStatus::Cancelled => "CANCELLED",
            EventStatus::Ended => "ENDED",
        }
    }
}

impl core::str::FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(EventStatus::Draft),
            "PUBLISHED" => Ok(EventStatus::Published),
            "CANCELLED" => Ok(EventStatus::Cancelled),
            "ENDED" => Ok(EventStatus::Ended),
            other => Err(DomainError::validation(format!("unknown event status '{other}'"))),
        }
    }
}

/// A catalogued event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub slug: String,
    pub location: String,
    pub banner_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Event {
    type Id = EventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Request to create an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub slug: String,
    pub location: String,
    #[serde(default)]
    pub banner_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewEvent {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("event name cannot be empty"));
        }
        if self.slug.trim().is_empty() {
            return Err(DomainError::validation("slug cannot be empty"));
        }
        if self.location.trim().is_empty() {
            return Err(DomainError::validation("location cannot be empty"));
        }
        if self.end_time < self.start_time {
            return Err(DomainError::validation("end_time must not be before start_time"));
        }
        Ok(())
    }

    pub fn into_event(self, id: EventId, now: DateTime<Utc>) -> DomainResult<Event> {
        self.validate()?;
        Ok(Event {
            id,
            name: self.name,
            slug: self.slug,
            location: self.location,
            banner_url: self.banner_url,
            start_time: self.start_time,
            end_time: self.end_time,
            status: EventStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Request to put a ticket type on sale for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicketType {
    pub name: String,
    pub price: Money,
    pub initial_quantity: u32,
}

impl NewTicketType {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("ticket type name cannot be empty"));
        }
        self.price.ensure_price()?;
        if self.initial_quantity == 0 {
            return Err(DomainError::validation("initial_quantity must be greater than 0"));
        }
        Ok(())
    }

    pub fn into_ticket_type(self, id: TicketTypeId, event_id: EventId) -> DomainResult<TicketType> {
        self.validate()?;
        Ok(TicketType::new(id, event_id, self.name, self.price, self.initial_quantity))
    }
}

/// Validate and shape an event together with its ticket types.
///
/// Either everything validates or nothing is produced.
pub fn plan_event_with_tickets(
    new_event: NewEvent,
    new_ticket_types: Vec<NewTicketType>,
    now: DateTime<Utc>,
) -> DomainResult<(Event, Vec<TicketType>)> {
    let event = new_event.into_event(EventId::new(), now)?;
    let ticket_types = new_ticket_types
        .into_iter()
        .map(|tt| tt.into_ticket_type(TicketTypeId::new(), event.id))
        .collect::<DomainResult<Vec<_>>>()?;
    Ok((event, ticket_types))
}

/// Page window for event listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EventPage {
    pub limit: u32,
    pub offset: u32,
}

impl EventPage {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Normalise raw query parameters: non-positive limit → default, limit
    /// capped at `MAX_LIMIT`, negative offset → 0.
    pub fn clamped(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(i64::from(Self::MAX_LIMIT)) as u32,
            _ => Self::DEFAULT_LIMIT,
        };
        let offset = offset.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;
        Self { limit, offset }
    }
}

impl Default for EventPage {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::any;
    use rust_decimal_macros::dec;

    fn new_event() -> NewEvent {
        let start = Utc::now();
        NewEvent {
            name: "Rust Conf".to_string(),
            slug: "rust-conf".to_string(),
            location: "Hall A".to_string(),
            banner_url: None,
            start_time: start,
            end_time: start + Duration::hours(3),
        }
    }

    fn new_ticket(name: &str, qty: u32) -> NewTicketType {
        NewTicketType {
            name: name.to_string(),
            price: Money::new(dec!(25.00)),
            initial_quantity: qty,
        }
    }

    #[test]
    fn plan_creates_draft_event_with_full_ticket_types() {
        let (event, tts) =
            plan_event_with_tickets(new_event(), vec![new_ticket("GA", 100), new_ticket("VIP", 5)], Utc::now())
                .unwrap();

        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(tts.len(), 2);
        assert!(tts.iter().all(|t| t.event_id == event.id));
        assert!(tts.iter().all(|t| t.remaining_quantity == t.initial_quantity));
    }

    #[test]
    fn one_invalid_ticket_type_rejects_the_whole_plan() {
        let err = plan_event_with_tickets(new_event(), vec![new_ticket("GA", 100), new_ticket("VIP", 0)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn event_must_not_end_before_it_starts() {
        let mut ev = new_event();
        ev.end_time = ev.start_time - Duration::minutes(1);
        assert!(ev.validate().is_err());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut ev = new_event();
        ev.slug = "   ".to_string();
        assert!(ev.validate().is_err());

        let mut tt = new_ticket("GA", 1);
        tt.price = Money::ZERO;
        assert!(tt.validate().is_err());
    }

    #[test]
    fn page_clamps_like_the_listing_endpoint() {
        assert_eq!(EventPage::clamped(None, None), EventPage { limit: 10, offset: 0 });
        assert_eq!(EventPage::clamped(Some(0), Some(-5)), EventPage { limit: 10, offset: 0 });
        assert_eq!(EventPage::clamped(Some(500), Some(20)), EventPage { limit: 100, offset: 20 });
        assert_eq!(EventPage::clamped(Some(42), None), EventPage { limit: 42, offset: 0 });
    }

    proptest::proptest! {
        #[test]
        fn clamped_page_is_always_within_bounds(limit in proptest::option::of(any::<i64>()), offset in proptest::option::of(any::<i64>())) {
            let page = EventPage::clamped(limit, offset);
            proptest::prop_assert!(page.limit >= 1 && page.limit <= EventPage::MAX_LIMIT);
            if let Some(o) = offset.filter(|o| *o >= 0 && *o <= i64::from(u32::MAX)) {
                proptest::prop_assert_eq!(i64::from(page.offset), o);
            }
        }
    }
}
