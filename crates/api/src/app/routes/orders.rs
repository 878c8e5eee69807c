use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use boxoffice_core::OrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::BuyerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(buyer): Extension<BuyerContext>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let lines = match body.into_lines() {
        Ok(lines) => lines,
        Err(resp) => return resp,
    };

    match services.place_order(buyer.user_id(), &lines).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::allocation_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(buyer): Extension<BuyerContext>,
) -> axum::response::Response {
    match services.list_orders(buyer.user_id()).await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Orders of other buyers are reported as missing.
pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(buyer): Extension<BuyerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(order_id) = id.parse::<OrderId>() else {
        return errors::invalid_id("order");
    };

    match services.get_order(buyer.user_id(), order_id).await {
        Ok(Some(order)) => Json(order).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("order {order_id} not found"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}
