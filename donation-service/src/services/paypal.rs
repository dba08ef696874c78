//! PayPal payment provider client.
//!
//! Thin, retryless request layer over the Orders v2 API (checkout capture),
//! the Billing v1 API (recurring subscriptions), and webhook signature
//! verification. Callers decide what a failed provider call means; nothing
//! here retries automatically.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;

use crate::config::PayPalConfig;
use crate::models::BillingFrequency;
use crate::services::cache::TtlCache;
use crate::services::sanitize::round2;

/// Refresh the cached bearer token when it is this close to expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
    token_cache: Arc<TtlCache<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct LinkDescription {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

impl Money {
    fn amount(&self) -> Result<f64, AppError> {
        self.value.parse::<f64>().map_err(|_| AppError::Provider {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: format!("unparseable amount in provider response: {}", self.value),
            body: None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceivableBreakdown {
    pub gross_amount: Option<Money>,
    pub paypal_fee: Option<Money>,
    pub net_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CaptureDetails {
    pub id: String,
    pub status: String,
    pub amount: Option<Money>,
    pub custom_id: Option<String>,
    pub seller_receivable_breakdown: Option<ReceivableBreakdown>,
    pub create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnitPayments {
    #[serde(default)]
    pub captures: Vec<CaptureDetails>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnit {
    pub description: Option<String>,
    pub custom_id: Option<String>,
    pub payments: Option<PurchaseUnitPayments>,
}

#[derive(Debug, Deserialize)]
pub struct PayerName {
    pub given_name: Option<String>,
    pub surname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Payer {
    pub name: Option<PayerName>,
    pub email_address: Option<String>,
    pub payer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
    pub payer: Option<Payer>,
}

/// Result of creating a checkout order.
#[derive(Debug)]
pub struct OrderCreated {
    pub order_id: String,
    pub approval_url: Option<String>,
}

/// Normalized view of a completed capture, flattened from the provider's
/// nested response. Consumed immediately by reconciliation.
#[derive(Debug, Clone)]
pub struct ProviderCapture {
    pub transaction_id: String,
    pub order_id: String,
    pub status: String,
    pub gross_amount: f64,
    pub provider_fee: f64,
    pub net_amount: f64,
    pub currency: String,
    pub payer_id: Option<String>,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub custom_id: Option<String>,
    pub description: Option<String>,
    pub captured_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct Subscriber {
    pub name: Option<PayerName>,
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LastPayment {
    pub amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct BillingInfo {
    pub last_payment: Option<LastPayment>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionResponse {
    pub id: String,
    /// Provider-defined status string, stored verbatim (e.g. `ACTIVE`,
    /// `APPROVAL_PENDING`, `CANCELLED`, `SUSPENDED`).
    pub status: String,
    pub plan_id: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    pub subscriber: Option<Subscriber>,
    pub billing_info: Option<BillingInfo>,
}

impl SubscriptionResponse {
    pub fn approval_url(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone())
    }
}

/// Signature material forwarded from the webhook request headers.
#[derive(Debug, Clone)]
pub struct WebhookSignature {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verification_status: String,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Self {
        Self::with_token_cache(config, Arc::new(TtlCache::new()))
    }

    /// Constructor with an injected token cache (tests drive expiry with a
    /// manual clock).
    pub fn with_token_cache(config: PayPalConfig, token_cache: Arc<TtlCache<String>>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            config,
            token_cache,
        }
    }

    /// Check if PayPal is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.client_secret.expose_secret().is_empty()
    }

    /// Fresh idempotency key per mutating call: a client-side retry of the
    /// same logical operation must not double-create at the provider.
    fn idempotency_key() -> String {
        format!(
            "{}-{:016x}",
            Utc::now().timestamp_millis(),
            rand::random::<u64>()
        )
    }

    fn transport_error(context: &str, err: reqwest::Error) -> AppError {
        AppError::Provider {
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            message: format!("{context}: {err}"),
            body: None,
        }
    }

    fn parse_error(context: &str, err: reqwest::Error) -> AppError {
        AppError::Internal(anyhow::anyhow!("invalid PayPal {context} response: {err}"))
    }

    /// Translate a non-2xx provider response into a structured error carrying
    /// the provider's message, raw body, and HTTP status.
    async fn provider_error(context: &str, response: reqwest::Response) -> AppError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                ["message", "error_description", "name"]
                    .iter()
                    .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(String::from))
            })
            .unwrap_or_else(|| format!("{context} failed"));
        tracing::error!(status, message = %message, "PayPal {} rejected", context);
        AppError::Provider {
            status,
            message,
            body: Some(body),
        }
    }

    async fn access_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.token_cache.get(TOKEN_REFRESH_MARGIN) {
            return Ok(token);
        }
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "PayPal credentials are not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.config.api_base_url))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::ProviderAuth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ProviderAuth(format!(
                "token endpoint returned {status}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderAuth(format!("invalid token response: {e}")))?;

        self.token_cache.put(
            token.access_token.clone(),
            Duration::from_secs(token.expires_in),
        );
        tracing::debug!(expires_in = token.expires_in, "PayPal bearer token refreshed");
        Ok(token.access_token)
    }

    /// Create a checkout order carrying the correlation blob in `custom_id`.
    pub async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        custom_id: &str,
        description: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<OrderCreated, AppError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": { "currency_code": currency, "value": format!("{amount:.2}") },
                "custom_id": custom_id,
                "description": description,
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.config.api_base_url))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("order creation request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("order creation", response).await);
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| Self::parse_error("order", e))?;
        let approval_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone());

        tracing::info!(order_id = %order.id, amount, currency, "PayPal order created");
        Ok(OrderCreated {
            order_id: order.id,
            approval_url,
        })
    }

    pub async fn get_order(&self, order_id: &str) -> Result<OrderResponse, AppError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{order_id}",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Self::transport_error("order fetch request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("order fetch", response).await);
        }

        response.json().await.map_err(|e| Self::parse_error("order", e))
    }

    /// Capture a previously-approved order.
    ///
    /// An order another path already captured (422 `ORDER_ALREADY_CAPTURED`)
    /// is not an error here: the recorded capture is fetched and returned so
    /// reconciliation can resolve it idempotently.
    pub async fn capture_order(&self, order_id: &str) -> Result<ProviderCapture, AppError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{order_id}/capture",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| Self::transport_error("capture request failed", e))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            if body.contains("ORDER_ALREADY_CAPTURED") {
                tracing::info!(order_id, "order already captured; fetching recorded capture");
                let order = self.get_order(order_id).await?;
                return Self::normalize_capture(order);
            }
            return Err(AppError::Provider {
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                message: "order capture rejected".to_string(),
                body: Some(body),
            });
        }

        if !response.status().is_success() {
            return Err(Self::provider_error("order capture", response).await);
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| Self::parse_error("capture", e))?;
        Self::normalize_capture(order)
    }

    fn normalize_capture(order: OrderResponse) -> Result<ProviderCapture, AppError> {
        let order_id = order.id;
        let unit = order.purchase_units.first().ok_or_else(|| AppError::Provider {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: format!("capture response for {order_id} has no purchase units"),
            body: None,
        })?;
        let capture = unit
            .payments
            .as_ref()
            .and_then(|p| p.captures.first())
            .ok_or_else(|| AppError::Provider {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("capture response for {order_id} has no capture details"),
                body: None,
            })?;

        let breakdown = capture.seller_receivable_breakdown.as_ref();
        let gross_money = breakdown
            .and_then(|b| b.gross_amount.as_ref())
            .or(capture.amount.as_ref())
            .ok_or_else(|| AppError::Provider {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("capture response for {order_id} is missing an amount"),
                body: None,
            })?;

        let gross_amount = gross_money.amount()?;
        let provider_fee = breakdown
            .and_then(|b| b.paypal_fee.as_ref())
            .map(|m| m.amount())
            .transpose()?
            .unwrap_or(0.0);
        let net_amount = breakdown
            .and_then(|b| b.net_amount.as_ref())
            .map(|m| m.amount())
            .transpose()?
            .unwrap_or_else(|| round2(gross_amount - provider_fee));

        let payer = order.payer.as_ref();
        let payer_name = payer.and_then(|p| p.name.as_ref()).and_then(|n| {
            let full = [n.given_name.as_deref(), n.surname.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if full.is_empty() { None } else { Some(full) }
        });

        Ok(ProviderCapture {
            transaction_id: capture.id.clone(),
            order_id,
            status: capture.status.clone(),
            gross_amount,
            provider_fee,
            net_amount,
            currency: gross_money.currency_code.clone(),
            payer_id: payer.and_then(|p| p.payer_id.clone()),
            payer_name,
            payer_email: payer.and_then(|p| p.email_address.clone()),
            custom_id: capture.custom_id.clone().or_else(|| unit.custom_id.clone()),
            description: unit.description.clone(),
            captured_at: capture.create_time.clone(),
        })
    }

    /// Provision the donation product used as the parent of billing plans.
    pub async fn create_product(&self, name: &str, description: &str) -> Result<String, AppError> {
        let token = self.access_token().await?;
        let body = json!({
            "name": name,
            "description": description,
            "type": "SERVICE",
            "category": "CHARITY",
        });

        let response = self
            .client
            .post(format!("{}/v1/catalogs/products", self.config.api_base_url))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("product creation request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("product creation", response).await);
        }

        let product: ProductResponse = response
            .json()
            .await
            .map_err(|e| Self::parse_error("product", e))?;
        tracing::info!(product_id = %product.id, "PayPal product created");
        Ok(product.id)
    }

    /// Create a billing plan for the requested frequency and amount.
    pub async fn create_plan(
        &self,
        product_id: &str,
        frequency: BillingFrequency,
        amount: f64,
        currency: &str,
    ) -> Result<String, AppError> {
        let token = self.access_token().await?;
        let (interval_unit, interval_count) = frequency.billing_cycle();
        let body = json!({
            "product_id": product_id,
            "name": format!("{} donation plan", frequency.as_str()),
            "billing_cycles": [{
                "frequency": {
                    "interval_unit": interval_unit,
                    "interval_count": interval_count,
                },
                "tenure_type": "REGULAR",
                "sequence": 1,
                "total_cycles": 0,
                "pricing_scheme": {
                    "fixed_price": { "currency_code": currency, "value": format!("{amount:.2}") },
                },
            }],
            "payment_preferences": {
                "auto_bill_outstanding": true,
                "payment_failure_threshold": 3,
            },
        });

        let response = self
            .client
            .post(format!("{}/v1/billing/plans", self.config.api_base_url))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("plan creation request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("plan creation", response).await);
        }

        let plan: PlanResponse = response
            .json()
            .await
            .map_err(|e| Self::parse_error("plan", e))?;
        tracing::info!(plan_id = %plan.id, frequency = frequency.as_str(), "PayPal plan created");
        Ok(plan.id)
    }

    pub async fn create_subscription(
        &self,
        plan_id: &str,
        custom_id: Option<&str>,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<SubscriptionResponse, AppError> {
        let token = self.access_token().await?;
        let mut body = json!({
            "plan_id": plan_id,
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
                "user_action": "SUBSCRIBE_NOW",
            },
        });
        if let Some(custom_id) = custom_id {
            body["custom_id"] = json!(custom_id);
        }

        let response = self
            .client
            .post(format!(
                "{}/v1/billing/subscriptions",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("subscription creation request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("subscription creation", response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Self::parse_error("subscription", e))
    }

    pub async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionResponse, AppError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/v1/billing/subscriptions/{subscription_id}",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Self::transport_error("subscription fetch request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("subscription fetch", response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Self::parse_error("subscription", e))
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        reason: &str,
    ) -> Result<(), AppError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v1/billing/subscriptions/{subscription_id}/cancel",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", Self::idempotency_key())
            .json(&json!({ "reason": reason }))
            .send()
            .await
            .map_err(|e| Self::transport_error("subscription cancel request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("subscription cancel", response).await);
        }
        Ok(())
    }

    /// Verify a webhook delivery against the provider's verification
    /// endpoint. Returns whether the signature checks out.
    pub async fn verify_webhook_signature(
        &self,
        webhook_id: &str,
        signature: &WebhookSignature,
        event: &serde_json::Value,
    ) -> Result<bool, AppError> {
        let token = self.access_token().await?;
        let body = json!({
            "auth_algo": signature.auth_algo,
            "cert_url": signature.cert_url,
            "transmission_id": signature.transmission_id,
            "transmission_sig": signature.transmission_sig,
            "transmission_time": signature.transmission_time,
            "webhook_id": webhook_id,
            "webhook_event": event,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.config.api_base_url
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("webhook verification request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::provider_error("webhook verification", response).await);
        }

        let verification: VerificationResponse = response
            .json()
            .await
            .map_err(|e| Self::parse_error("verification", e))?;
        Ok(verification.verification_status == "SUCCESS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> PayPalConfig {
        PayPalConfig {
            client_id: "client_123".to_string(),
            client_secret: Secret::new("secret_456".to_string()),
            api_base_url: base_url.to_string(),
            webhook_id: Some("WH-123".to_string()),
            return_url: "https://example.org/return".to_string(),
            cancel_url: "https://example.org/cancel".to_string(),
            request_timeout_secs: 5,
        }
    }

    fn token_mock() -> Mock {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A21.token",
                "token_type": "Bearer",
                "expires_in": 32400,
            })))
    }

    #[test]
    fn is_configured_requires_both_credentials() {
        let client = PayPalClient::new(test_config("https://api.example.org"));
        assert!(client.is_configured());

        let mut config = test_config("https://api.example.org");
        config.client_id = String::new();
        let client = PayPalClient::new(config);
        assert!(!client.is_configured());
    }

    #[test]
    fn idempotency_keys_are_unique() {
        let a = PayPalClient::idempotency_key();
        let b = PayPalClient::idempotency_key();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        token_mock().expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ORD-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ORD-1",
                "status": "CREATED",
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        client.get_order("ORD-1").await.unwrap();
        client.get_order("ORD-1").await.unwrap();
    }

    #[tokio::test]
    async fn create_order_returns_approval_url() {
        let server = MockServer::start().await;
        token_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .and(body_partial_json(serde_json::json!({ "intent": "CAPTURE" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "ORD-42",
                "status": "CREATED",
                "links": [
                    { "href": "https://paypal.test/self", "rel": "self" },
                    { "href": "https://paypal.test/approve/ORD-42", "rel": "approve" },
                ],
            })))
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        let created = client
            .create_order(
                50.0,
                "USD",
                "{\"p\":\"x\"}",
                "General Donation",
                "https://example.org/return",
                "https://example.org/cancel",
            )
            .await
            .unwrap();

        assert_eq!(created.order_id, "ORD-42");
        assert_eq!(
            created.approval_url.as_deref(),
            Some("https://paypal.test/approve/ORD-42")
        );
    }

    #[tokio::test]
    async fn capture_parses_fee_breakdown() {
        let server = MockServer::start().await;
        token_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/ORD-7/capture"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "ORD-7",
                "status": "COMPLETED",
                "purchase_units": [{
                    "custom_id": "{\"p\":\"abc\"}",
                    "description": "Annadaana Seva",
                    "payments": {
                        "captures": [{
                            "id": "TXN-900",
                            "status": "COMPLETED",
                            "amount": { "currency_code": "USD", "value": "50.00" },
                            "seller_receivable_breakdown": {
                                "gross_amount": { "currency_code": "USD", "value": "50.00" },
                                "paypal_fee": { "currency_code": "USD", "value": "1.75" },
                                "net_amount": { "currency_code": "USD", "value": "48.25" },
                            },
                        }],
                    },
                }],
                "payer": {
                    "name": { "given_name": "Asha", "surname": "Rao" },
                    "email_address": "asha@example.org",
                    "payer_id": "PAYER-1",
                },
            })))
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        let capture = client.capture_order("ORD-7").await.unwrap();

        assert_eq!(capture.transaction_id, "TXN-900");
        assert_eq!(capture.status, "COMPLETED");
        assert_eq!(capture.gross_amount, 50.0);
        assert_eq!(capture.provider_fee, 1.75);
        assert_eq!(capture.net_amount, 48.25);
        assert_eq!(capture.payer_name.as_deref(), Some("Asha Rao"));
        assert_eq!(capture.custom_id.as_deref(), Some("{\"p\":\"abc\"}"));
    }

    #[tokio::test]
    async fn provider_rejection_carries_status_and_message() {
        let server = MockServer::start().await;
        token_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "name": "INVALID_REQUEST",
                "message": "Request is not well-formed.",
            })))
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        let err = client
            .create_order(50.0, "USD", "", "", "https://r", "https://c")
            .await
            .unwrap_err();

        match err {
            AppError::Provider { status, message, .. } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Request is not well-formed.");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_captured_order_resolves_via_order_fetch() {
        let server = MockServer::start().await;
        token_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/ORD-9/capture"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "name": "UNPROCESSABLE_ENTITY",
                "details": [{ "issue": "ORDER_ALREADY_CAPTURED" }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ORD-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ORD-9",
                "status": "COMPLETED",
                "purchase_units": [{
                    "payments": {
                        "captures": [{
                            "id": "TXN-321",
                            "status": "COMPLETED",
                            "amount": { "currency_code": "USD", "value": "25.00" },
                        }],
                    },
                }],
            })))
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        let capture = client.capture_order("ORD-9").await.unwrap();
        assert_eq!(capture.transaction_id, "TXN-321");
        assert_eq!(capture.gross_amount, 25.0);
        assert_eq!(capture.provider_fee, 0.0);
    }

    #[tokio::test]
    async fn webhook_verification_maps_status() {
        let server = MockServer::start().await;
        token_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/notifications/verify-webhook-signature"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verification_status": "FAILURE",
            })))
            .mount(&server)
            .await;

        let client = PayPalClient::new(test_config(&server.uri()));
        let signature = WebhookSignature {
            transmission_id: "tid".to_string(),
            transmission_time: "2025-01-01T00:00:00Z".to_string(),
            transmission_sig: "sig".to_string(),
            cert_url: "https://paypal.test/cert".to_string(),
            auth_algo: "SHA256withRSA".to_string(),
        };
        let valid = client
            .verify_webhook_signature("WH-123", &signature, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_token_fetch() {
        let mut config = test_config("https://api.example.org");
        config.client_id = String::new();
        config.client_secret = Secret::new(String::new());
        let client = PayPalClient::new(config);

        let err = client.get_order("ORD-1").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
