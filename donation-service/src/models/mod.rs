mod correlation;
mod donation;
mod pending;
mod subscription;

pub use correlation::{CorrelationBlob, CUSTOM_ID_MAX_LEN};
pub use donation::{Donation, DonationMetadata, DonationType, PaymentStatus};
pub use pending::{PendingDonation, PendingStatus, PENDING_TTL_HOURS};
pub use subscription::BillingFrequency;
