//! Recurring-donation lifecycle: plan/product provisioning, subscription
//! creation and activation, cancellation, and per-charge recording.

use std::time::Duration;

use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    BillingFrequency, Donation, DonationMetadata, DonationType, PaymentStatus,
};
use crate::services::cache::TtlCache;
use crate::services::paypal::PayPalClient;
use crate::services::repository::{DonationStore, StoreError};
use crate::services::sanitize;

/// The donation product is provisioned once and reused.
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const PRODUCT_NAME: &str = "Temple Donations";
const PRODUCT_DESCRIPTION: &str = "Recurring donation to the temple";

#[derive(Debug)]
pub struct SubscriptionCreated {
    pub subscription_id: String,
    pub plan_id: String,
    pub status: String,
    pub approval_url: Option<String>,
}

/// Provision (or reuse) the product, create a plan for the requested
/// frequency/amount, then create the subscription. Failures here surface to
/// the caller; nothing has been persisted locally yet.
pub async fn create_subscription(
    paypal: &PayPalClient,
    product_cache: &TtlCache<String>,
    amount: f64,
    currency: &str,
    frequency: BillingFrequency,
    custom_id: Option<&str>,
    return_url: &str,
    cancel_url: &str,
) -> Result<SubscriptionCreated, AppError> {
    let amount = sanitize::validate_amount(amount).map_err(|e| AppError::Validation(vec![e]))?;

    let product_id = match product_cache.get(Duration::ZERO) {
        Some(cached) => cached,
        None => {
            let created = paypal
                .create_product(PRODUCT_NAME, PRODUCT_DESCRIPTION)
                .await?;
            product_cache.put(created.clone(), PRODUCT_CACHE_TTL);
            created
        }
    };

    let plan_id = paypal
        .create_plan(&product_id, frequency, amount, currency)
        .await?;
    let subscription = paypal
        .create_subscription(&plan_id, custom_id, return_url, cancel_url)
        .await?;

    tracing::info!(
        subscription_id = %subscription.id,
        plan_id = %plan_id,
        frequency = frequency.as_str(),
        amount,
        "subscription created"
    );

    Ok(SubscriptionCreated {
        approval_url: subscription.approval_url(),
        subscription_id: subscription.id,
        plan_id,
        status: subscription.status,
    })
}

/// Called after the subscriber approves. Fetches the provider's view of the
/// subscription and records (or refreshes) the correlated recurring donation
/// row. `ACTIVE` maps to completed; anything else stays pending.
pub async fn activate_subscription(
    store: &dyn DonationStore,
    paypal: &PayPalClient,
    subscription_id: &str,
) -> Result<Donation, AppError> {
    let subscription = paypal.get_subscription(subscription_id).await?;
    let payment_status = if subscription.status == "ACTIVE" {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Pending
    };

    let now = DateTime::now();

    // One activation row per subscription: a replayed webhook or a second
    // activation call updates the existing row instead of inserting.
    if let Some(mut existing) = store.find_subscription_donation(subscription_id).await? {
        existing.payment_status = payment_status;
        existing.updated_at = now;
        store.update_donation(&existing).await?;
        return Ok(existing);
    }

    let subscriber = subscription.subscriber.as_ref();
    let donor_name = subscriber
        .and_then(|s| s.name.as_ref())
        .and_then(|n| {
            let full = [n.given_name.as_deref(), n.surname.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if full.is_empty() { None } else { Some(full) }
        })
        .unwrap_or_else(|| super::capture::ANONYMOUS_DONOR.to_string());
    let donor_email = subscriber
        .and_then(|s| s.email_address.as_deref())
        .map(str::to_lowercase);

    let amount = subscription
        .billing_info
        .as_ref()
        .and_then(|b| b.last_payment.as_ref())
        .and_then(|p| p.amount.as_ref())
        .and_then(|m| m.value.parse::<f64>().ok())
        .unwrap_or(0.0);

    let donation = Donation {
        id: Uuid::new_v4(),
        donor_name,
        donor_email,
        donor_phone: None,
        amount,
        currency: "USD".to_string(),
        donation_type: DonationType::Recurring,
        payment_method: "paypal".to_string(),
        payment_status,
        purpose: "Recurring donation".to_string(),
        metadata: DonationMetadata {
            subscription_id: Some(subscription_id.to_string()),
            plan_id: subscription.plan_id.clone(),
            ..Default::default()
        },
        created_at: now,
        updated_at: now,
    };

    store.insert_donation(&donation).await?;
    tracing::info!(
        subscription_id,
        donation_id = %donation.id,
        status = payment_status.as_str(),
        "subscription activation recorded"
    );
    Ok(donation)
}

/// Cancel at the provider, then flip every correlated local row to
/// cancelled. Correlation is a metadata equality lookup, not a join.
pub async fn cancel_subscription(
    store: &dyn DonationStore,
    paypal: &PayPalClient,
    subscription_id: &str,
    reason: &str,
) -> Result<u64, AppError> {
    paypal.cancel_subscription(subscription_id, reason).await?;

    let updated = store
        .update_donations_by_subscription(subscription_id, PaymentStatus::Cancelled)
        .await?;
    tracing::info!(subscription_id, updated, "subscription cancelled");
    Ok(updated)
}

/// Record one recurring charge, keyed by the provider's sale transaction id.
/// A replayed webhook for the same sale is a no-op; returns whether a new
/// row was written.
pub async fn record_recurring_payment(
    store: &dyn DonationStore,
    sale_id: &str,
    subscription_id: Option<&str>,
    amount: f64,
    currency: &str,
) -> Result<bool, AppError> {
    if store.find_donation_by_transaction(sale_id).await?.is_some() {
        tracing::debug!(sale_id, "recurring charge already recorded");
        return Ok(false);
    }

    let now = DateTime::now();
    let donation = Donation {
        id: Uuid::new_v4(),
        donor_name: super::capture::ANONYMOUS_DONOR.to_string(),
        donor_email: None,
        donor_phone: None,
        amount,
        currency: currency.to_string(),
        donation_type: DonationType::Recurring,
        payment_method: "paypal".to_string(),
        payment_status: PaymentStatus::Completed,
        purpose: "Recurring donation charge".to_string(),
        metadata: DonationMetadata {
            transaction_id: Some(sale_id.to_string()),
            subscription_id: subscription_id.map(str::to_string),
            gross_amount: Some(amount),
            ..Default::default()
        },
        created_at: now,
        updated_at: now,
    };

    match store.insert_donation(&donation).await {
        Ok(()) => {
            tracing::info!(sale_id, subscription_id, amount, "recurring charge recorded");
            Ok(true)
        }
        Err(StoreError::DuplicateTransaction) => Ok(false),
        Err(StoreError::Database(source)) => Err(AppError::RecordingFailed {
            transaction_id: sale_id.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayPalConfig;
    use crate::services::repository::memory::InMemoryDonationStore;
    use secrecy::Secret;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paypal_client(base_url: &str) -> PayPalClient {
        PayPalClient::new(PayPalConfig {
            client_id: "client".to_string(),
            client_secret: Secret::new("secret".to_string()),
            api_base_url: base_url.to_string(),
            webhook_id: None,
            return_url: "https://example.org/return".to_string(),
            cancel_url: "https://example.org/cancel".to_string(),
            request_timeout_secs: 5,
        })
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A21.token",
                "token_type": "Bearer",
                "expires_in": 32400,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_subscription_provisions_product_once() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/catalogs/products"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "id": "PROD-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/billing/plans"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "PLAN-1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/billing/subscriptions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "SUB-1",
                "status": "APPROVAL_PENDING",
                "links": [{ "href": "https://paypal.test/approve/SUB-1", "rel": "approve" }],
            })))
            .mount(&server)
            .await;

        let paypal = paypal_client(&server.uri());
        let product_cache = TtlCache::new();

        let first = create_subscription(
            &paypal,
            &product_cache,
            25.0,
            "USD",
            BillingFrequency::Monthly,
            None,
            "https://example.org/return",
            "https://example.org/cancel",
        )
        .await
        .unwrap();
        assert_eq!(first.subscription_id, "SUB-1");
        assert_eq!(first.plan_id, "PLAN-1");
        assert_eq!(
            first.approval_url.as_deref(),
            Some("https://paypal.test/approve/SUB-1")
        );

        // Second creation reuses the cached product; the product mock's
        // expect(1) verifies no second provisioning call happened.
        create_subscription(
            &paypal,
            &product_cache,
            10.0,
            "USD",
            BillingFrequency::Weekly,
            None,
            "https://example.org/return",
            "https://example.org/cancel",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn create_subscription_rejects_out_of_bounds_amount() {
        let paypal = paypal_client("https://api.example.org");
        let product_cache = TtlCache::new();
        let err = create_subscription(
            &paypal,
            &product_cache,
            0.5,
            "USD",
            BillingFrequency::Monthly,
            None,
            "https://r",
            "https://c",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn activation_is_idempotent_per_subscription() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/billing/subscriptions/SUB-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "SUB-2",
                "status": "ACTIVE",
                "plan_id": "PLAN-2",
                "subscriber": {
                    "name": { "given_name": "Meera", "surname": "Iyer" },
                    "email_address": "Meera@Example.org",
                },
            })))
            .mount(&server)
            .await;

        let store = InMemoryDonationStore::new();
        let paypal = paypal_client(&server.uri());

        let first = activate_subscription(&store, &paypal, "SUB-2").await.unwrap();
        assert_eq!(first.donation_type, DonationType::Recurring);
        assert_eq!(first.payment_status, PaymentStatus::Completed);
        assert_eq!(first.donor_name, "Meera Iyer");
        assert_eq!(first.donor_email.as_deref(), Some("meera@example.org"));
        assert_eq!(store.donation_count(), 1);

        let second = activate_subscription(&store, &paypal, "SUB-2").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(store.donation_count(), 1);
    }

    #[tokio::test]
    async fn non_active_subscription_records_pending() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/billing/subscriptions/SUB-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "SUB-3",
                "status": "APPROVAL_PENDING",
            })))
            .mount(&server)
            .await;

        let store = InMemoryDonationStore::new();
        let paypal = paypal_client(&server.uri());

        let donation = activate_subscription(&store, &paypal, "SUB-3").await.unwrap();
        assert_eq!(donation.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn recurring_charge_is_keyed_by_sale_id() {
        let store = InMemoryDonationStore::new();

        let inserted =
            record_recurring_payment(&store, "SALE-1", Some("SUB-4"), 25.0, "USD")
                .await
                .unwrap();
        assert!(inserted);
        assert_eq!(store.donation_count(), 1);

        // Duplicate webhook delivery for the same sale: no-op.
        let inserted =
            record_recurring_payment(&store, "SALE-1", Some("SUB-4"), 25.0, "USD")
                .await
                .unwrap();
        assert!(!inserted);
        assert_eq!(store.donation_count(), 1);
    }
}
