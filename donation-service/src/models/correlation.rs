use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The provider truncates `custom_id` beyond this length.
pub const CUSTOM_ID_MAX_LEN: usize = 127;

/// Compact correlation payload embedded in the provider's `custom_id` field
/// at order creation and echoed back on capture.
///
/// Serialized with one-letter keys to fit the provider's size limit. Decoding
/// also accepts the legacy long-key shape (`pendingDonationId`,
/// `receiptNumber`, `donationType`) emitted by the previous implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationBlob {
    #[serde(
        rename = "p",
        alias = "pendingDonationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_id: Option<String>,
    #[serde(
        rename = "r",
        alias = "receiptNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub receipt_number: Option<String>,
    #[serde(
        rename = "t",
        alias = "donationType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub donation_type: Option<String>,
}

impl CorrelationBlob {
    /// Serialize for embedding. If the encoded form would exceed the
    /// provider's limit the receipt number is dropped first; the pending id
    /// is the one field capture reconciliation cannot recover elsewhere.
    pub fn encode(&self) -> String {
        let encoded = serde_json::to_string(self).unwrap_or_default();
        if encoded.len() <= CUSTOM_ID_MAX_LEN {
            return encoded;
        }
        let trimmed = CorrelationBlob {
            receipt_number: None,
            ..self.clone()
        };
        serde_json::to_string(&trimmed).unwrap_or_default()
    }

    /// Best-effort decode; an absent or unparseable blob is not an error.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn pending_uuid(&self) -> Option<Uuid> {
        self.pending_id.as_deref().and_then(|s| Uuid::parse_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_short_keys() {
        let blob = CorrelationBlob {
            pending_id: Some("0ce9a5a1-2f3e-4a68-9c3f-55c6f7b9a111".to_string()),
            receipt_number: Some("RCPT-20250101-000042".to_string()),
            donation_type: Some("annadaana".to_string()),
        };

        let encoded = blob.encode();
        assert!(encoded.len() <= CUSTOM_ID_MAX_LEN);
        assert!(encoded.contains("\"p\""));
        assert!(encoded.contains("\"r\""));
        assert!(encoded.contains("\"t\""));

        assert_eq!(CorrelationBlob::decode(&encoded), Some(blob));
    }

    #[test]
    fn decodes_legacy_long_key_shape() {
        let raw = r#"{"pendingDonationId":"abc","receiptNumber":"RCPT-1","donationType":"puja"}"#;
        let blob = CorrelationBlob::decode(raw).expect("legacy shape should decode");
        assert_eq!(blob.pending_id.as_deref(), Some("abc"));
        assert_eq!(blob.receipt_number.as_deref(), Some("RCPT-1"));
        assert_eq!(blob.donation_type.as_deref(), Some("puja"));
    }

    #[test]
    fn oversized_blob_drops_receipt_before_pending_id() {
        let blob = CorrelationBlob {
            pending_id: Some("0ce9a5a1-2f3e-4a68-9c3f-55c6f7b9a111".to_string()),
            receipt_number: Some("R".repeat(200)),
            donation_type: Some("general".to_string()),
        };

        let encoded = blob.encode();
        assert!(encoded.len() <= CUSTOM_ID_MAX_LEN);
        let decoded = CorrelationBlob::decode(&encoded).unwrap();
        assert!(decoded.receipt_number.is_none());
        assert_eq!(decoded.pending_id, blob.pending_id);
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert_eq!(CorrelationBlob::decode("not json"), None);
        assert_eq!(CorrelationBlob::decode(""), None);
    }
}
