//! Donation checkout handlers: initiation, capture, and status polling.

use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{
    CaptureRequest, CaptureResponse, DonationStatusResponse, InitiateDonationRequest,
    InitiateDonationResponse,
};
use crate::models::{CorrelationBlob, PendingDonation, PendingStatus, PENDING_TTL_HOURS};
use crate::services::capture::{self, CaptureOutcome};
use crate::services::sanitize;
use crate::AppState;

fn generate_receipt_number() -> String {
    format!(
        "RCPT-{}-{:06}",
        Utc::now().format("%Y%m%d"),
        rand::random::<u32>() % 1_000_000
    )
}

/// Start a checkout: persist the pending record, create the provider order,
/// and hand the approval URL back for the browser redirect.
pub async fn initiate_donation(
    State(state): State<AppState>,
    Json(payload): Json<InitiateDonationRequest>,
) -> Result<(StatusCode, Json<InitiateDonationResponse>), AppError> {
    let sanitized = sanitize::sanitize_donation_input(&payload).map_err(AppError::Validation)?;

    if !state.paypal.is_configured() {
        return Err(AppError::Configuration(
            "payment provider is not configured".to_string(),
        ));
    }

    let receipt_number = generate_receipt_number();
    let now = DateTime::now();
    let pending = PendingDonation {
        id: Uuid::new_v4(),
        donor_name: sanitized.donor_name.clone(),
        donor_email: sanitized.donor_email.clone(),
        donor_phone: sanitized.donor_phone.clone(),
        amount: sanitized.amount,
        currency: sanitized.currency.clone(),
        campaign_name: sanitized.campaign_name.clone(),
        donation_type: sanitized.donation_type,
        message: sanitized.message.clone(),
        metadata: sanitized.metadata.clone(),
        receipt_number: receipt_number.clone(),
        status: PendingStatus::Pending,
        provider_order_id: None,
        donation_id: None,
        created_at: now,
        expires_at: DateTime::from_millis(
            now.timestamp_millis() + PENDING_TTL_HOURS * 60 * 60 * 1000,
        ),
    };

    // Without this record no later capture can be reconciled, so a failure
    // here is fatal to the whole initiation.
    state.store.create_pending(&pending).await?;

    tracing::info!(
        pending_id = %pending.id,
        amount = pending.amount,
        donation_type = pending.donation_type.as_str(),
        "pending donation created"
    );

    let blob = CorrelationBlob {
        pending_id: Some(pending.id.to_string()),
        receipt_number: Some(receipt_number.clone()),
        donation_type: Some(pending.donation_type.as_str().to_string()),
    };
    let description = sanitized
        .campaign_name
        .clone()
        .unwrap_or_else(|| format!("{} donation", sanitized.donation_type.as_str()));
    let return_url = payload
        .return_url
        .as_deref()
        .unwrap_or(&state.config.paypal.return_url);
    let cancel_url = payload
        .cancel_url
        .as_deref()
        .unwrap_or(&state.config.paypal.cancel_url);

    let order = match state
        .paypal
        .create_order(
            sanitized.amount,
            &sanitized.currency,
            &blob.encode(),
            &description,
            return_url,
            cancel_url,
        )
        .await
    {
        Ok(order) => order,
        Err(e) => {
            if let Err(mark_err) = state.store.mark_pending_failed(pending.id).await {
                tracing::warn!(
                    pending_id = %pending.id,
                    error = %mark_err,
                    "failed to mark pending donation failed"
                );
            }
            return Err(e);
        }
    };

    if let Err(e) = state.store.attach_order(pending.id, &order.order_id).await {
        // Roll the logical operation to failed rather than leaving a
        // provider order with no local trace of what happened to it.
        tracing::error!(
            pending_id = %pending.id,
            order_id = %order.order_id,
            error = %e,
            "failed to attach provider order to pending donation"
        );
        if let Err(mark_err) = state.store.mark_pending_failed(pending.id).await {
            tracing::warn!(
                pending_id = %pending.id,
                error = %mark_err,
                "failed to mark pending donation failed"
            );
        }
        return Err(e.into());
    }

    Ok((
        StatusCode::CREATED,
        Json(InitiateDonationResponse {
            pending_id: pending.id,
            order_id: order.order_id,
            approval_url: order.approval_url,
            receipt_number,
        }),
    ))
}

/// Capture an approved order and record the donation. Safe to call more
/// than once for the same order; replays return the original record.
pub async fn capture_donation(
    State(state): State<AppState>,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, AppError> {
    let outcome =
        capture::capture_and_record(state.store.as_ref(), &state.paypal, &payload.order_id)
            .await?;

    if !outcome.already_recorded {
        // Best-effort: a receipt that never sends must not fail the capture.
        if let Err(e) = state.mailer.send_receipt(&outcome.donation).await {
            tracing::warn!(
                donation_id = %outcome.donation.id,
                error = %e,
                "receipt email failed"
            );
        }
    }

    Ok(Json(capture_response(outcome)))
}

fn capture_response(outcome: CaptureOutcome) -> CaptureResponse {
    let CaptureOutcome {
        donation,
        already_recorded,
    } = outcome;
    CaptureResponse {
        donation_id: donation.id,
        transaction_id: donation.metadata.transaction_id,
        receipt_number: donation.metadata.receipt_number,
        status: donation.payment_status,
        amount: donation.amount,
        currency: donation.currency,
        provider_fee: donation.metadata.provider_fee,
        net_amount: donation.metadata.net_amount,
        donor_name: donation.donor_name,
        donor_email: donation.donor_email,
        already_recorded,
    }
}

/// Polling endpoint for the frontend after the redirect returns.
pub async fn donation_status(
    State(state): State<AppState>,
    Path(pending_id): Path<Uuid>,
) -> Result<Json<DonationStatusResponse>, AppError> {
    let pending = state
        .store
        .find_pending(pending_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Pending donation not found")))?;

    let donation = match pending.donation_id {
        Some(donation_id) => state.store.find_donation(donation_id).await?,
        None => None,
    };

    Ok(Json(DonationStatusResponse {
        pending_id: pending.id,
        status: pending.status,
        donation_type: pending.donation_type,
        receipt_number: pending.receipt_number,
        donation_id: pending.donation_id,
        payment_status: donation.as_ref().map(|d| d.payment_status),
        transaction_id: donation.and_then(|d| d.metadata.transaction_id),
    }))
}
