use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxoffice_core::{
    DomainError, DomainResult, Entity, Money, OrderId, OrderItemId, TicketTypeId, UserId,
};
use boxoffice_inventory::TicketType;

/// Order status.
///
/// Orders are created `Pending`. Payment and cancellation flows do not exist
/// yet, so nothing moves an order out of that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// One requested line of a purchase: which ticket type and how many.
///
/// Lines are not deduplicated; the same ticket type may appear twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(ticket_type_id: TicketTypeId, quantity: u32) -> Self {
        Self {
            ticket_type_id,
            quantity,
        }
    }
}

/// Reject requests that can never succeed before any lock is taken.
pub fn validate_lines(lines: &[OrderLineRequest]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one line"));
    }
    if let Some((idx, line)) = lines.iter().enumerate().find(|(_, l)| l.quantity == 0) {
        return Err(DomainError::validation(format!(
            "quantity must be greater than 0 (line {idx}, ticket type {})",
            line.ticket_type_id
        )));
    }
    Ok(())
}

/// Order line with the unit price frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> DomainResult<Money> {
        self.unit_price.times(self.quantity)
    }
}

/// Order aggregate: header + ordered lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn quantity_of(&self, ticket_type_id: TicketTypeId) -> u32 {
        self.items
            .iter()
            .filter(|i| i.ticket_type_id == ticket_type_id)
            .map(|i| i.quantity)
            .sum()
    }

    /// `total_amount` must equal the sum of the line totals.
    pub fn check_total(&self) -> DomainResult<()> {
        let mut sum = Money::ZERO;
        for item in &self.items {
            sum = sum.plus(item.line_total()?)?;
        }
        if sum != self.total_amount {
            return Err(DomainError::invariant(format!(
                "order {} total {} does not match line sum {sum}",
                self.id, self.total_amount
            )));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// An order under construction inside an allocation transaction.
///
/// Each accepted line snapshots the ticket type's price and adds its line
/// total to the running total. Nothing here touches stock; the caller does
/// that under lock before adding the line.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    id: OrderId,
    user_id: UserId,
    total: Money,
    items: Vec<OrderItem>,
}

impl OrderDraft {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            total: Money::ZERO,
            items: Vec::new(),
        }
    }

    /// Append a line priced from `ticket_type` as it is right now.
    pub fn add_line(&mut self, ticket_type: &TicketType, quantity: u32) -> DomainResult<&OrderItem> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than 0"));
        }

        let line_total = ticket_type.price.times(quantity)?;
        let total = self.total.plus(line_total)?;
        total.ensure_order_total()?;
        self.total = total;
        self.items.push(OrderItem {
            id: OrderItemId::new(),
            order_id: self.id,
            ticket_type_id: ticket_type.id,
            quantity,
            unit_price: ticket_type.price,
        });

        let idx = self.items.len() - 1;
        Ok(&self.items[idx])
    }

    /// Seal the draft into a `Pending` order stamped at `now`.
    pub fn finish(self, now: DateTime<Utc>) -> DomainResult<Order> {
        if self.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one line"));
        }
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            total_amount: self.total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            items: self.items,
        })
    }
}
