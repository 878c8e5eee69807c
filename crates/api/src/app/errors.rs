use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use boxoffice_infra::store::StoreError;
use boxoffice_infra::{AllocationError, CatalogError};

pub fn allocation_error_to_response(err: AllocationError) -> axum::response::Response {
    match err {
        AllocationError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AllocationError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({
                "error": "not_found",
                "message": format!("ticket type {id} not found"),
                "ticket_type_id": id,
            })),
        )
            .into_response(),
        AllocationError::InsufficientStock {
            ticket_type_name,
            remaining,
            requested,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock for '{ticket_type_name}': {remaining} remaining, {requested} requested"
                ),
                "ticket_type": ticket_type_name,
                "remaining": remaining,
                "requested": requested,
            })),
        )
            .into_response(),
        AllocationError::TransientConflict(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", msg)
        }
        AllocationError::PersistenceFailure(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", msg)
        }
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match err {
        CatalogError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CatalogError::SlugTaken(slug) => json_error(
            StatusCode::CONFLICT,
            "slug_taken",
            format!("slug '{slug}' is already taken"),
        ),
        CatalogError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        CatalogError::Conflict(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", msg),
        CatalogError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", msg),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
    }
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
