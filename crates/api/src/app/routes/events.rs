use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use boxoffice_catalog::EventPage;
use boxoffice_core::EventId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::BuyerContext;

pub fn public_router() -> Router {
    Router::new()
        .route("/", get(list_events))
        .route("/slug/:slug", get(get_event_by_slug))
        .route("/:id", get(get_event))
}

pub fn router() -> Router {
    Router::new().route("/", post(create_event))
}

pub async fn create_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<BuyerContext>,
    Json(body): Json<dto::CreateEventRequest>,
) -> axum::response::Response {
    if let Err(e) = caller.ensure_admin("create events") {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.create_event(body.event, body.ticket_types).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListEventsQuery>,
) -> axum::response::Response {
    let page = EventPage::clamped(query.limit, query.offset);
    match services.list_events(page).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_event(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(event_id) = id.parse::<EventId>() else {
        return errors::invalid_id("event");
    };

    match services.get_event(event_id).await {
        Ok(event) => Json(event).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_event_by_slug(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    match services.get_event_by_slug(&slug).await {
        Ok(event) => Json(event).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
