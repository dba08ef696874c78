//! HTTP handlers for donation-service.

pub mod donations;
pub mod subscriptions;
pub mod webhooks;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness and config-presence check. No side effects, no auth.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.environment,
            "paypal_configured": state.paypal.is_configured(),
            "email_enabled": state.mailer.is_enabled(),
        })),
    )
}
