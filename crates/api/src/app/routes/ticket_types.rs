use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use boxoffice_core::TicketTypeId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::BuyerContext;

pub fn public_router() -> Router {
    Router::new().route("/:id", get(get_ticket_type))
}

pub fn router() -> Router {
    Router::new().route("/:id/price", put(update_price))
}

pub async fn get_ticket_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(ticket_type_id) = id.parse::<TicketTypeId>() else {
        return errors::invalid_id("ticket type");
    };

    match services.get_ticket_type(ticket_type_id).await {
        Ok(tt) => Json(tt).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// Affects orders placed from now on; existing order lines keep their price.
pub async fn update_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<BuyerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePriceRequest>,
) -> axum::response::Response {
    if let Err(e) = caller.ensure_admin("change ticket prices") {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let Ok(ticket_type_id) = id.parse::<TicketTypeId>() else {
        return errors::invalid_id("ticket type");
    };

    match services.update_ticket_type_price(ticket_type_id, body.price).await {
        Ok(tt) => Json(tt).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
