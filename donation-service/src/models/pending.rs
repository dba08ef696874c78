use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DonationType;

/// How long an initiated checkout stays reconcilable.
pub const PENDING_TTL_HOURS: i64 = 24;

/// Linear lifecycle; no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Processing => "processing",
            PendingStatus::Completed => "completed",
            PendingStatus::Failed => "failed",
        }
    }
}

/// Staging record bridging the redirect-based checkout and the later
/// capture/webhook confirmation. Owned exclusively by the payment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDonation {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub donor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_phone: Option<String>,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    pub donation_type: DonationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub receipt_number: String,
    pub status: PendingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<Uuid>,
    pub created_at: DateTime,
    pub expires_at: DateTime,
}
