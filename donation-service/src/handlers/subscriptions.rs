//! Subscription lifecycle handlers. Legacy aliases accept the subscription
//! id in the body instead of the path and behave identically.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    ActivateSubscriptionRequest, ActivateSubscriptionResponse, CancelSubscriptionRequest,
    CancelSubscriptionResponse, CreateSubscriptionRequest, CreateSubscriptionResponse,
    SubscriptionStatusResponse,
};
use crate::models::BillingFrequency;
use crate::services::subscription;
use crate::AppState;

const DEFAULT_CANCEL_REASON: &str = "Cancelled by donor";

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<CreateSubscriptionResponse>), AppError> {
    if !state.paypal.is_configured() {
        return Err(AppError::Configuration(
            "payment provider is not configured".to_string(),
        ));
    }

    let frequency = BillingFrequency::from_string(&payload.frequency);
    let currency = payload
        .currency
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| "USD".to_string());
    let return_url = payload
        .return_url
        .as_deref()
        .unwrap_or(&state.config.paypal.return_url);
    let cancel_url = payload
        .cancel_url
        .as_deref()
        .unwrap_or(&state.config.paypal.cancel_url);

    let created = subscription::create_subscription(
        &state.paypal,
        &state.product_cache,
        payload.amount,
        &currency,
        frequency,
        None,
        return_url,
        cancel_url,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSubscriptionResponse {
            subscription_id: created.subscription_id,
            plan_id: created.plan_id,
            status: created.status,
            approval_url: created.approval_url,
        }),
    ))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    let subscription = state.paypal.get_subscription(&subscription_id).await?;
    Ok(Json(SubscriptionStatusResponse {
        subscription_id: subscription.id,
        status: subscription.status,
        plan_id: subscription.plan_id,
    }))
}

async fn activate(
    state: &AppState,
    subscription_id: &str,
) -> Result<Json<ActivateSubscriptionResponse>, AppError> {
    let donation =
        subscription::activate_subscription(state.store.as_ref(), &state.paypal, subscription_id)
            .await?;
    Ok(Json(ActivateSubscriptionResponse {
        subscription_id: subscription_id.to_string(),
        donation_id: donation.id,
        payment_status: donation.payment_status,
    }))
}

pub async fn activate_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<ActivateSubscriptionResponse>, AppError> {
    activate(&state, &subscription_id).await
}

pub async fn activate_subscription_legacy(
    State(state): State<AppState>,
    Json(payload): Json<ActivateSubscriptionRequest>,
) -> Result<Json<ActivateSubscriptionResponse>, AppError> {
    activate(&state, &payload.subscription_id).await
}

async fn cancel(
    state: &AppState,
    subscription_id: &str,
    reason: Option<&str>,
) -> Result<Json<CancelSubscriptionResponse>, AppError> {
    let updated = subscription::cancel_subscription(
        state.store.as_ref(),
        &state.paypal,
        subscription_id,
        reason.unwrap_or(DEFAULT_CANCEL_REASON),
    )
    .await?;
    Ok(Json(CancelSubscriptionResponse {
        subscription_id: subscription_id.to_string(),
        status: "cancelled".to_string(),
        donations_updated: updated,
    }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    payload: Option<Json<CancelSubscriptionRequest>>,
) -> Result<Json<CancelSubscriptionResponse>, AppError> {
    let reason = payload.as_ref().and_then(|p| p.reason.as_deref());
    cancel(&state, &subscription_id, reason).await
}

pub async fn cancel_subscription_legacy(
    State(state): State<AppState>,
    Json(payload): Json<CancelSubscriptionRequest>,
) -> Result<Json<CancelSubscriptionResponse>, AppError> {
    let subscription_id = payload.subscription_id.as_deref().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("subscription_id is required"))
    })?;
    cancel(&state, subscription_id, payload.reason.as_deref()).await
}
