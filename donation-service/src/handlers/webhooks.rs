//! Provider webhook endpoint: signature verification, then dispatch.

use anyhow::anyhow;
use axum::{extract::State, http::HeaderMap, Json};
use service_core::error::AppError;

use crate::dtos::WebhookResponse;
use crate::services::paypal::WebhookSignature;
use crate::services::webhook::{self, WebhookEvent};
use crate::AppState;

fn signature_from_headers(headers: &HeaderMap) -> Option<WebhookSignature> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    Some(WebhookSignature {
        transmission_id: get("paypal-transmission-id")?,
        transmission_time: get("paypal-transmission-time")?,
        transmission_sig: get("paypal-transmission-sig")?,
        cert_url: get("paypal-cert-url")?,
        auth_algo: get("paypal-auth-algo")?,
    })
}

/// Receives provider push notifications. Verification runs against the raw
/// event body whenever a webhook id is configured; skipping it is an
/// explicit, logged trust degradation, never a silent one.
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, AppError> {
    let event_value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(anyhow!("invalid webhook payload: {e}")))?;

    match &state.config.paypal.webhook_id {
        Some(webhook_id) => {
            let signature = signature_from_headers(&headers).ok_or_else(|| {
                AppError::Unauthorized(anyhow!("missing webhook signature headers"))
            })?;
            let valid = state
                .paypal
                .verify_webhook_signature(webhook_id, &signature, &event_value)
                .await?;
            if !valid {
                return Err(AppError::Unauthorized(anyhow!(
                    "webhook signature verification failed"
                )));
            }
        }
        None => {
            tracing::warn!(
                "webhook signature verification skipped: PAYPAL_WEBHOOK_ID not configured"
            );
        }
    }

    let event: WebhookEvent = serde_json::from_value(event_value)
        .map_err(|e| AppError::BadRequest(anyhow!("invalid webhook event: {e}")))?;

    let outcome = webhook::dispatch(state.store.as_ref(), &state.paypal, &event).await;

    Ok(Json(WebhookResponse {
        processed: outcome.processed,
        action: outcome.action.to_string(),
        correlating_id: outcome.correlating_id,
    }))
}
