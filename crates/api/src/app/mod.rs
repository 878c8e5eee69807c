//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection (in-memory or Postgres) and the service facade
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and their mapping onto domain inputs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use boxoffice_infra::store::StoreError;
use boxoffice_infra::AppConfig;

use crate::identity::{Hs256Identity, IdentityProvider};
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the router over already-constructed services.
pub fn build_router(services: AppServices, identity: Arc<dyn IdentityProvider>) -> Router {
    let auth_state = middleware::AuthState { identity };
    let services = Arc::new(services);

    let public = routes::public_router().layer(Extension(Arc::clone(&services)));

    // Protected routes: require a bearer token identifying the caller.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Build the full HTTP router from configuration (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StoreError> {
    let services = services::build_services(config).await?;
    let identity = Arc::new(Hs256Identity::new(config.jwt_secret.as_bytes()));
    Ok(build_router(services, identity))
}
