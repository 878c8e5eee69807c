//! Request DTOs and their mapping onto domain inputs.
//!
//! Responses serialize domain types directly (`Order`, `Event`, `TicketType`).

use axum::http::StatusCode;
use serde::Deserialize;

use boxoffice_catalog::{NewEvent, NewTicketType};
use boxoffice_core::{Money, TicketTypeId};
use boxoffice_orders::OrderLineRequest;

use crate::app::errors::json_error;

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub ticket_type_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

impl PlaceOrderRequest {
    /// Parse ids and quantities. Emptiness is left to the allocator.
    pub fn into_lines(self) -> Result<Vec<OrderLineRequest>, axum::response::Response> {
        self.items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let ticket_type_id: TicketTypeId = item.ticket_type_id.parse().map_err(|_| {
                    json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_id",
                        format!("items[{idx}].ticket_type_id is not a valid id"),
                    )
                })?;
                let quantity = u32::try_from(item.quantity)
                    .ok()
                    .filter(|q| *q > 0)
                    .ok_or_else(|| {
                        json_error(
                            StatusCode::BAD_REQUEST,
                            "validation_error",
                            format!("items[{idx}].quantity must be a positive integer"),
                        )
                    })?;
                Ok(OrderLineRequest::new(ticket_type_id, quantity))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(flatten)]
    pub event: NewEvent,
    #[serde(default)]
    pub ticket_types: Vec<NewTicketType>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub price: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: serde_json::Value) -> PlaceOrderRequest {
        serde_json::from_value(serde_json::json!({ "items": items })).unwrap()
    }

    #[test]
    fn lines_keep_request_order() {
        let a = TicketTypeId::new();
        let b = TicketTypeId::new();
        let lines = request(serde_json::json!([
            { "ticket_type_id": b.to_string(), "quantity": 2 },
            { "ticket_type_id": a.to_string(), "quantity": 1 },
        ]))
        .into_lines()
        .unwrap();

        assert_eq!(lines, vec![OrderLineRequest::new(b, 2), OrderLineRequest::new(a, 1)]);
    }

    #[test]
    fn bad_id_and_non_positive_quantity_are_bad_requests() {
        let bad_id = request(serde_json::json!([{ "ticket_type_id": "nope", "quantity": 1 }])).into_lines();
        assert_eq!(bad_id.unwrap_err().status(), StatusCode::BAD_REQUEST);

        let negative = request(serde_json::json!([
            { "ticket_type_id": TicketTypeId::new().to_string(), "quantity": -1 }
        ]))
        .into_lines();
        assert_eq!(negative.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
