use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of donation categories.
///
/// A persisted donation's type is always a member of this set; a value
/// outside it is a data-integrity violation, not a valid state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationType {
    General,
    Puja,
    Annadaana,
    Recurring,
    Service,
    SaiAangan,
    ServiceToNeedy,
}

impl DonationType {
    pub const ALL: [DonationType; 7] = [
        DonationType::General,
        DonationType::Puja,
        DonationType::Annadaana,
        DonationType::Recurring,
        DonationType::Service,
        DonationType::SaiAangan,
        DonationType::ServiceToNeedy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DonationType::General => "general",
            DonationType::Puja => "puja",
            DonationType::Annadaana => "annadaana",
            DonationType::Recurring => "recurring",
            DonationType::Service => "service",
            DonationType::SaiAangan => "sai_aangan",
            DonationType::ServiceToNeedy => "service_to_needy",
        }
    }

    /// Case-insensitive parse of an explicit type name. Returns `None` for
    /// anything outside the closed set.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Cancelled,
    Suspended,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Suspended => "suspended",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Provider bookkeeping carried alongside each donation.
///
/// `transaction_id` is the idempotency key for the whole pipeline: at most
/// one donation exists per provider transaction id, enforced by a unique
/// index. Net/fee amounts are recorded here for accounting; the donation's
/// `amount` is always the gross figure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DonationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_donation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
}

/// Durable record of money received. Append-mostly: the pipeline creates
/// exactly one row per confirmed transaction and never deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub donor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_phone: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub donation_type: DonationType,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub purpose: String,
    pub metadata: DonationMetadata,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_every_member_case_insensitively() {
        for ty in DonationType::ALL {
            assert_eq!(DonationType::parse(ty.as_str()), Some(ty));
            assert_eq!(DonationType::parse(&ty.as_str().to_uppercase()), Some(ty));
        }
    }

    #[test]
    fn parse_rejects_values_outside_the_set() {
        assert_eq!(DonationType::parse("bitcoin"), None);
        assert_eq!(DonationType::parse(""), None);
        assert_eq!(DonationType::parse("generall"), None);
    }

    #[test]
    fn serde_names_are_stable() {
        let json = serde_json::to_string(&DonationType::SaiAangan).unwrap();
        assert_eq!(json, "\"sai_aangan\"");
        let json = serde_json::to_string(&DonationType::ServiceToNeedy).unwrap();
        assert_eq!(json, "\"service_to_needy\"");
    }
}
