//! Webhook event dispatch.
//!
//! Effectively a total function from `(event_type, resource)` to a side
//! effect. Capture recording deliberately does not happen here: the capture
//! path (`services::capture`) owns it, and `PAYMENT.CAPTURE.COMPLETED` is
//! acknowledged only.

use serde::Deserialize;
use serde_json::Value;

use crate::services::paypal::PayPalClient;
use crate::services::repository::DonationStore;
use crate::services::subscription;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub resource: Value,
}

#[derive(Debug)]
pub struct WebhookOutcome {
    pub processed: bool,
    pub action: &'static str,
    pub correlating_id: Option<String>,
}

impl WebhookOutcome {
    fn new(processed: bool, action: &'static str, correlating_id: Option<String>) -> Self {
        Self {
            processed,
            action,
            correlating_id,
        }
    }
}

fn resource_id(resource: &Value) -> Option<String> {
    resource.get("id").and_then(Value::as_str).map(String::from)
}

/// The order id for a capture resource lives in the supplementary related
/// ids; older payloads only carry the capture id itself.
fn order_id_from_capture(resource: &Value) -> Option<String> {
    resource
        .pointer("/supplementary_data/related_ids/order_id")
        .and_then(Value::as_str)
        .map(String::from)
}

fn sale_amount(resource: &Value) -> (f64, String) {
    let amount = resource
        .pointer("/amount/total")
        .and_then(Value::as_str)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);
    let currency = resource
        .pointer("/amount/currency")
        .and_then(Value::as_str)
        .unwrap_or("USD")
        .to_string();
    (amount, currency)
}

pub async fn dispatch(
    store: &dyn DonationStore,
    paypal: &PayPalClient,
    event: &WebhookEvent,
) -> WebhookOutcome {
    let event_type = event.event_type.as_str();
    tracing::info!(event_type, event_id = ?event.id, "processing webhook event");

    match event_type {
        "CHECKOUT.ORDER.APPROVED" => {
            WebhookOutcome::new(true, "order_approved", resource_id(&event.resource))
        }

        // Recording happens on the capture path, not here.
        "PAYMENT.CAPTURE.COMPLETED" => {
            WebhookOutcome::new(true, "capture_completed", resource_id(&event.resource))
        }

        "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
            let order_id = order_id_from_capture(&event.resource);
            match &order_id {
                Some(order_id) => match store.find_pending_by_order(order_id).await {
                    Ok(Some(pending)) => {
                        if let Err(e) = store.mark_pending_failed(pending.id).await {
                            tracing::warn!(
                                order_id,
                                error = %e,
                                "failed to mark pending donation failed"
                            );
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(order_id, "capture denied for unknown order");
                    }
                    Err(e) => {
                        tracing::warn!(order_id, error = %e, "pending lookup failed");
                    }
                },
                None => tracing::warn!("capture denied event without an order id"),
            }
            WebhookOutcome::new(true, "capture_denied", order_id)
        }

        // No local state change; refunds are handled administratively.
        "PAYMENT.CAPTURE.REFUNDED" => {
            WebhookOutcome::new(true, "capture_refunded", resource_id(&event.resource))
        }

        "BILLING.SUBSCRIPTION.ACTIVATED" => {
            let subscription_id = resource_id(&event.resource);
            if let Some(id) = &subscription_id {
                // Recoverable: the subscription still exists at the provider
                // and a later poll or webhook can retry.
                if let Err(e) = subscription::activate_subscription(store, paypal, id).await {
                    tracing::warn!(subscription_id = %id, error = %e, "activation failed");
                }
            }
            WebhookOutcome::new(true, "subscription_activated", subscription_id)
        }

        "BILLING.SUBSCRIPTION.CANCELLED" | "BILLING.SUBSCRIPTION.SUSPENDED" => {
            let status = if event_type == "BILLING.SUBSCRIPTION.CANCELLED" {
                crate::models::PaymentStatus::Cancelled
            } else {
                crate::models::PaymentStatus::Suspended
            };
            let subscription_id = resource_id(&event.resource);
            if let Some(id) = &subscription_id {
                match store.update_donations_by_subscription(id, status).await {
                    Ok(updated) => {
                        tracing::info!(
                            subscription_id = %id,
                            updated,
                            status = status.as_str(),
                            "subscription donations updated"
                        );
                    }
                    Err(e) => {
                        tracing::error!(subscription_id = %id, error = %e, "update failed");
                    }
                }
            }
            WebhookOutcome::new(true, "subscription_status_changed", subscription_id)
        }

        "PAYMENT.SALE.COMPLETED" => {
            let sale_id = resource_id(&event.resource);
            if let Some(id) = &sale_id {
                let subscription_id = event
                    .resource
                    .get("billing_agreement_id")
                    .and_then(Value::as_str);
                let (amount, currency) = sale_amount(&event.resource);
                if let Err(e) = subscription::record_recurring_payment(
                    store,
                    id,
                    subscription_id,
                    amount,
                    &currency,
                )
                .await
                {
                    tracing::warn!(sale_id = %id, error = %e, "recurring charge not recorded");
                }
            }
            WebhookOutcome::new(true, "recurring_payment", sale_id)
        }

        _ => {
            tracing::debug!(event_type, "unhandled webhook event type");
            WebhookOutcome::new(false, "unhandled", event.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayPalConfig;
    use crate::models::{
        Donation, DonationMetadata, DonationType, PaymentStatus, PendingDonation, PendingStatus,
    };
    use crate::services::repository::memory::InMemoryDonationStore;
    use mongodb::bson::DateTime;
    use secrecy::Secret;
    use uuid::Uuid;

    fn paypal_stub() -> PayPalClient {
        PayPalClient::new(PayPalConfig {
            client_id: String::new(),
            client_secret: Secret::new(String::new()),
            api_base_url: "https://api.invalid".to_string(),
            webhook_id: None,
            return_url: "https://example.org/return".to_string(),
            cancel_url: "https://example.org/cancel".to_string(),
            request_timeout_secs: 5,
        })
    }

    fn event(event_type: &str, resource: Value) -> WebhookEvent {
        WebhookEvent {
            id: Some("WH-EVT-1".to_string()),
            event_type: event_type.to_string(),
            resource,
        }
    }

    fn recurring_donation(subscription_id: &str) -> Donation {
        let now = DateTime::now();
        Donation {
            id: Uuid::new_v4(),
            donor_name: "Meera Iyer".to_string(),
            donor_email: None,
            donor_phone: None,
            amount: 25.0,
            currency: "USD".to_string(),
            donation_type: DonationType::Recurring,
            payment_method: "paypal".to_string(),
            payment_status: PaymentStatus::Completed,
            purpose: "Recurring donation".to_string(),
            metadata: DonationMetadata {
                subscription_id: Some(subscription_id.to_string()),
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn cancellation_touches_only_the_correlated_subscription() {
        let store = InMemoryDonationStore::new();
        store.insert_donation(&recurring_donation("S1")).await.unwrap();
        store.insert_donation(&recurring_donation("S2")).await.unwrap();

        let outcome = dispatch(
            &store,
            &paypal_stub(),
            &event(
                "BILLING.SUBSCRIPTION.CANCELLED",
                serde_json::json!({ "id": "S1" }),
            ),
        )
        .await;

        assert!(outcome.processed);
        assert_eq!(outcome.correlating_id.as_deref(), Some("S1"));

        let donations = store.donations.lock().unwrap();
        for donation in donations.iter() {
            match donation.metadata.subscription_id.as_deref() {
                Some("S1") => assert_eq!(donation.payment_status, PaymentStatus::Cancelled),
                Some("S2") => assert_eq!(donation.payment_status, PaymentStatus::Completed),
                other => panic!("unexpected subscription id {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn suspension_maps_to_suspended_status() {
        let store = InMemoryDonationStore::new();
        store.insert_donation(&recurring_donation("S3")).await.unwrap();

        dispatch(
            &store,
            &paypal_stub(),
            &event(
                "BILLING.SUBSCRIPTION.SUSPENDED",
                serde_json::json!({ "id": "S3" }),
            ),
        )
        .await;

        let donations = store.donations.lock().unwrap();
        assert_eq!(donations[0].payment_status, PaymentStatus::Suspended);
    }

    #[tokio::test]
    async fn capture_denied_marks_pending_failed() {
        let store = InMemoryDonationStore::new();
        let now = DateTime::now();
        let pending = PendingDonation {
            id: Uuid::new_v4(),
            donor_name: "Asha Rao".to_string(),
            donor_email: None,
            donor_phone: None,
            amount: 50.0,
            currency: "USD".to_string(),
            campaign_name: None,
            donation_type: DonationType::General,
            message: None,
            metadata: serde_json::Value::Null,
            receipt_number: "RCPT-1".to_string(),
            status: PendingStatus::Processing,
            provider_order_id: Some("ORD-D1".to_string()),
            donation_id: None,
            created_at: now,
            expires_at: now,
        };
        let pending_id = pending.id;
        store.create_pending(&pending).await.unwrap();

        let outcome = dispatch(
            &store,
            &paypal_stub(),
            &event(
                "PAYMENT.CAPTURE.DENIED",
                serde_json::json!({
                    "id": "CAP-1",
                    "supplementary_data": { "related_ids": { "order_id": "ORD-D1" } },
                }),
            ),
        )
        .await;

        assert!(outcome.processed);
        assert_eq!(outcome.correlating_id.as_deref(), Some("ORD-D1"));
        let stored = store.find_pending(pending_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PendingStatus::Failed);
    }

    #[tokio::test]
    async fn sale_completed_records_a_recurring_charge() {
        let store = InMemoryDonationStore::new();

        let outcome = dispatch(
            &store,
            &paypal_stub(),
            &event(
                "PAYMENT.SALE.COMPLETED",
                serde_json::json!({
                    "id": "SALE-9",
                    "billing_agreement_id": "S9",
                    "amount": { "total": "25.00", "currency": "USD" },
                }),
            ),
        )
        .await;

        assert!(outcome.processed);
        assert_eq!(outcome.action, "recurring_payment");
        assert_eq!(store.donation_count(), 1);
        let donations = store.donations.lock().unwrap();
        assert_eq!(donations[0].amount, 25.0);
        assert_eq!(
            donations[0].metadata.transaction_id.as_deref(),
            Some("SALE-9")
        );
        assert_eq!(
            donations[0].metadata.subscription_id.as_deref(),
            Some("S9")
        );
    }

    #[tokio::test]
    async fn completed_capture_is_acknowledged_without_recording() {
        let store = InMemoryDonationStore::new();

        let outcome = dispatch(
            &store,
            &paypal_stub(),
            &event(
                "PAYMENT.CAPTURE.COMPLETED",
                serde_json::json!({ "id": "CAP-2" }),
            ),
        )
        .await;

        assert!(outcome.processed);
        assert_eq!(outcome.action, "capture_completed");
        assert_eq!(store.donation_count(), 0);
    }

    #[tokio::test]
    async fn unknown_events_are_acknowledged_as_unhandled() {
        let store = InMemoryDonationStore::new();

        let outcome = dispatch(
            &store,
            &paypal_stub(),
            &event("CUSTOMER.DISPUTE.CREATED", serde_json::json!({})),
        )
        .await;

        assert!(!outcome.processed);
        assert_eq!(outcome.action, "unhandled");
        assert_eq!(outcome.correlating_id.as_deref(), Some("WH-EVT-1"));
    }
}
