use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DonationType, PaymentStatus, PendingStatus};

#[derive(Debug, Deserialize)]
pub struct InitiateDonationRequest {
    pub amount: f64,
    pub donor_name: String,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub campaign_name: Option<String>,
    pub donation_type: Option<String>,
    pub message: Option<String>,
    pub currency: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiateDonationResponse {
    pub pending_id: Uuid,
    pub order_id: String,
    pub approval_url: Option<String>,
    pub receipt_number: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub donation_id: Uuid,
    pub transaction_id: Option<String>,
    pub receipt_number: Option<String>,
    pub status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub provider_fee: Option<f64>,
    pub net_amount: Option<f64>,
    pub donor_name: String,
    pub donor_email: Option<String>,
    /// True when this call returned a previously recorded donation.
    pub already_recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct DonationStatusResponse {
    pub pending_id: Uuid,
    pub status: PendingStatus,
    pub donation_type: DonationType,
    pub receipt_number: String,
    pub donation_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub processed: bool,
    pub action: String,
    pub correlating_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub amount: f64,
    pub frequency: String,
    pub currency: Option<String>,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    pub plan_id: String,
    pub status: String,
    pub approval_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateSubscriptionRequest {
    pub subscription_id: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateSubscriptionResponse {
    pub subscription_id: String,
    pub donation_id: Uuid,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    /// Required by the legacy body-based alias; the path-based route takes
    /// the id from the URL instead.
    pub subscription_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelSubscriptionResponse {
    pub subscription_id: String,
    pub status: String,
    pub donations_updated: u64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub subscription_id: String,
    pub status: String,
    pub plan_id: Option<String>,
}
