use serde::{Deserialize, Serialize};
use thiserror::Error;

use boxoffice_core::{DomainError, DomainResult, Entity, EventId, Money, TicketTypeId};

/// A purchasable admission category with a price and a finite stock.
///
/// Invariant: `remaining_quantity <= initial_quantity`. The unsigned type
/// rules out negative stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    pub id: TicketTypeId,
    pub event_id: EventId,
    pub name: String,
    pub price: Money,
    pub initial_quantity: u32,
    pub remaining_quantity: u32,
}

/// Not enough stock left to satisfy a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient stock for '{ticket_type_name}': {remaining} remaining, {requested} requested")]
pub struct StockShortfall {
    pub ticket_type_name: String,
    pub remaining: u32,
    pub requested: u32,
}

impl TicketType {
    /// A freshly catalogued ticket type: nothing sold yet.
    pub fn new(
        id: TicketTypeId,
        event_id: EventId,
        name: impl Into<String>,
        price: Money,
        initial_quantity: u32,
    ) -> Self {
        Self {
            id,
            event_id,
            name: name.into(),
            price,
            initial_quantity,
            remaining_quantity: initial_quantity,
        }
    }

    /// Check that `requested` units can be taken from this row.
    ///
    /// Callers must hold the row lock, otherwise the answer is stale the moment
    /// it is returned.
    pub fn ensure_available(&self, requested: u32) -> Result<(), StockShortfall> {
        if self.remaining_quantity < requested {
            return Err(StockShortfall {
                ticket_type_name: self.name.clone(),
                remaining: self.remaining_quantity,
                requested,
            });
        }
        Ok(())
    }

    /// Relative decrement: `remaining -= quantity`.
    ///
    /// Refuses to go below zero; reaching that branch means the caller skipped
    /// `ensure_available` under lock.
    pub fn decrement(&mut self, quantity: u32) -> DomainResult<()> {
        self.remaining_quantity = self
            .remaining_quantity
            .checked_sub(quantity)
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "remaining_quantity of {} would go negative ({} - {quantity})",
                    self.id, self.remaining_quantity
                ))
            })?;
        Ok(())
    }

    pub fn check_invariant(&self) -> DomainResult<()> {
        if self.remaining_quantity > self.initial_quantity {
            return Err(DomainError::invariant(format!(
                "remaining_quantity {} exceeds initial_quantity {} for {}",
                self.remaining_quantity, self.initial_quantity, self.id
            )));
        }
        Ok(())
    }
}

impl Entity for TicketType {
    type Id = TicketTypeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
