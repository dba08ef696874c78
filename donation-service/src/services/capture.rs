//! Capture & reconciliation: resolves the synchronous redirect path and the
//! asynchronous webhook path to exactly one donation record per provider
//! transaction.

use anyhow::anyhow;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    CorrelationBlob, Donation, DonationMetadata, DonationType, PaymentStatus, PendingDonation,
};
use crate::services::paypal::{PayPalClient, ProviderCapture};
use crate::services::repository::{DonationStore, StoreError};

pub const ANONYMOUS_DONOR: &str = "Anonymous Donor";
pub const DEFAULT_PURPOSE: &str = "General Donation";

const ORDER_ID_MAX_LEN: usize = 64;

#[derive(Debug)]
pub struct CaptureOutcome {
    pub donation: Donation,
    /// True when this transaction was recorded by an earlier call and the
    /// existing row was returned unchanged.
    pub already_recorded: bool,
}

/// Shape check before any network call.
pub fn validate_order_id(order_id: &str) -> Result<(), AppError> {
    let valid = !order_id.is_empty()
        && order_id.len() <= ORDER_ID_MAX_LEN
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow!("Invalid order id")))
    }
}

/// Capture a provider order and record the donation, idempotently.
///
/// A capture that succeeds at the provider but fails to record locally is a
/// financial discrepancy: it surfaces as `RecordingFailed` carrying the
/// provider transaction id, never as a silent success.
pub async fn capture_and_record(
    store: &dyn DonationStore,
    paypal: &PayPalClient,
    order_id: &str,
) -> Result<CaptureOutcome, AppError> {
    validate_order_id(order_id)?;

    let capture = paypal.capture_order(order_id).await?;
    if capture.status != "COMPLETED" {
        return Err(AppError::BadRequest(anyhow!(
            "Order capture did not complete (provider status {})",
            capture.status
        )));
    }

    // Idempotency: at most one donation per provider transaction id. A hit
    // here makes duplicate redirects and webhook replays safe.
    if let Some(existing) = store
        .find_donation_by_transaction(&capture.transaction_id)
        .await?
    {
        tracing::info!(
            transaction_id = %capture.transaction_id,
            donation_id = %existing.id,
            "transaction already recorded; returning existing donation"
        );
        return Ok(CaptureOutcome {
            donation: existing,
            already_recorded: true,
        });
    }

    let blob = capture
        .custom_id
        .as_deref()
        .and_then(CorrelationBlob::decode)
        .unwrap_or_default();

    // A missing pending record is a valid outcome (legacy flow); proceed
    // with whatever the provider response carries.
    let pending = match store.find_pending_by_order(order_id).await? {
        Some(found) => Some(found),
        None => match blob.pending_uuid() {
            Some(pending_id) => store.find_pending(pending_id).await?,
            None => None,
        },
    };

    let donation = build_donation(&capture, pending.as_ref(), &blob)?;

    match store.insert_donation(&donation).await {
        Ok(()) => {}
        Err(StoreError::DuplicateTransaction) => {
            // Lost the insert race to a concurrent capture of the same
            // transaction; the earlier row wins.
            let existing = store
                .find_donation_by_transaction(&capture.transaction_id)
                .await?
                .ok_or_else(|| AppError::RecordingFailed {
                    transaction_id: capture.transaction_id.clone(),
                    source: anyhow!("duplicate reported but no existing donation found"),
                })?;
            return Ok(CaptureOutcome {
                donation: existing,
                already_recorded: true,
            });
        }
        Err(StoreError::Database(source)) => {
            tracing::error!(
                transaction_id = %capture.transaction_id,
                order_id,
                error = %source,
                "payment captured but donation insert failed"
            );
            return Err(AppError::RecordingFailed {
                transaction_id: capture.transaction_id.clone(),
                source,
            });
        }
    }

    tracing::info!(
        donation_id = %donation.id,
        transaction_id = %capture.transaction_id,
        amount = donation.amount,
        donation_type = donation.donation_type.as_str(),
        "donation recorded"
    );

    // Bookkeeping only; a failure here must not undo the recorded donation.
    if let Err(e) = store.mark_pending_completed(order_id, donation.id).await {
        tracing::warn!(order_id, error = %e, "failed to mark pending donation completed");
    }

    Ok(CaptureOutcome {
        donation,
        already_recorded: false,
    })
}

fn build_donation(
    capture: &ProviderCapture,
    pending: Option<&PendingDonation>,
    blob: &CorrelationBlob,
) -> Result<Donation, AppError> {
    // Donor identity: pending record, then provider payer, then placeholders.
    let donor_name = pending
        .map(|p| p.donor_name.clone())
        .or_else(|| capture.payer_name.clone())
        .unwrap_or_else(|| ANONYMOUS_DONOR.to_string());
    let donor_email = pending
        .and_then(|p| p.donor_email.clone())
        .or_else(|| capture.payer_email.as_deref().map(str::to_lowercase));
    let donor_phone = pending.and_then(|p| p.donor_phone.clone());

    let purpose = pending
        .and_then(|p| p.message.clone().or_else(|| p.campaign_name.clone()))
        .or_else(|| capture.description.clone())
        .unwrap_or_else(|| DEFAULT_PURPOSE.to_string());

    let donation_type = resolve_recorded_type(pending, blob)?;

    let receipt_number = pending
        .map(|p| p.receipt_number.clone())
        .or_else(|| blob.receipt_number.clone());

    let now = DateTime::now();
    Ok(Donation {
        id: Uuid::new_v4(),
        donor_name,
        donor_email,
        donor_phone,
        // Gross, never net; the fee breakdown lives in metadata.
        amount: capture.gross_amount,
        currency: capture.currency.clone(),
        donation_type,
        payment_method: "paypal".to_string(),
        payment_status: PaymentStatus::Completed,
        purpose,
        metadata: DonationMetadata {
            transaction_id: Some(capture.transaction_id.clone()),
            order_id: Some(capture.order_id.clone()),
            receipt_number,
            gross_amount: Some(capture.gross_amount),
            provider_fee: Some(capture.provider_fee),
            net_amount: Some(capture.net_amount),
            payer_id: capture.payer_id.clone(),
            pending_donation_id: pending.map(|p| p.id.to_string()),
            ..Default::default()
        },
        created_at: now,
        updated_at: now,
    })
}

/// The recorded type must be a member of the closed enumeration. A pending
/// record always carries a valid type; a correlation blob naming something
/// outside the set is a data-integrity defect and is surfaced, not coerced.
fn resolve_recorded_type(
    pending: Option<&PendingDonation>,
    blob: &CorrelationBlob,
) -> Result<DonationType, AppError> {
    if let Some(pending) = pending {
        return Ok(pending.donation_type);
    }
    match blob.donation_type.as_deref() {
        None => Ok(DonationType::General),
        Some(raw) => DonationType::parse(raw).ok_or_else(|| {
            AppError::Internal(anyhow!(
                "donation type '{raw}' is outside the closed enumeration"
            ))
        }),
    }
}
