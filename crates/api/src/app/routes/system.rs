use axum::{http::StatusCode, response::IntoResponse, Extension, Json};

use crate::context::BuyerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(buyer): Extension<BuyerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": buyer.user_id().to_string(),
        "role": buyer.role(),
    }))
}
