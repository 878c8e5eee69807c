use axum::{routing::get, Router};

pub mod events;
pub mod orders;
pub mod system;
pub mod ticket_types;

/// Read-only catalog endpoints; no token required.
pub fn public_router() -> Router {
    Router::new()
        .nest("/events", events::public_router())
        .nest("/ticket-types", ticket_types::public_router())
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/events", events::router())
        .nest("/ticket-types", ticket_types::router())
}
