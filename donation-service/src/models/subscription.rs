use serde::{Deserialize, Serialize};

/// Billing frequency for recurring donations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Weekly => "weekly",
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::Quarterly => "quarterly",
            BillingFrequency::Yearly => "yearly",
        }
    }

    /// Unrecognized input defaults to monthly.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "weekly" => BillingFrequency::Weekly,
            "quarterly" => BillingFrequency::Quarterly,
            "yearly" | "annual" | "annually" => BillingFrequency::Yearly,
            _ => BillingFrequency::Monthly,
        }
    }

    /// Provider billing-cycle mapping: `(interval_unit, interval_count)`.
    pub fn billing_cycle(&self) -> (&'static str, u32) {
        match self {
            BillingFrequency::Weekly => ("WEEK", 1),
            BillingFrequency::Monthly => ("MONTH", 1),
            BillingFrequency::Quarterly => ("MONTH", 3),
            BillingFrequency::Yearly => ("YEAR", 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_maps_to_provider_cycles() {
        assert_eq!(BillingFrequency::Weekly.billing_cycle(), ("WEEK", 1));
        assert_eq!(BillingFrequency::Monthly.billing_cycle(), ("MONTH", 1));
        assert_eq!(BillingFrequency::Quarterly.billing_cycle(), ("MONTH", 3));
        assert_eq!(BillingFrequency::Yearly.billing_cycle(), ("YEAR", 1));
    }

    #[test]
    fn unrecognized_frequency_defaults_to_monthly() {
        assert_eq!(
            BillingFrequency::from_string("fortnightly"),
            BillingFrequency::Monthly
        );
        assert_eq!(BillingFrequency::from_string(""), BillingFrequency::Monthly);
        assert_eq!(
            BillingFrequency::from_string("WEEKLY"),
            BillingFrequency::Weekly
        );
    }
}
