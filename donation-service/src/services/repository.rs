//! Durable storage for pending donations and recorded donations.
//!
//! The store is a trait so the capture/webhook/subscription logic can be
//! exercised against an in-memory double in tests; production uses MongoDB.

use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Donation, PaymentStatus, PendingDonation, PendingStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A donation with this provider transaction id already exists. Callers
    /// treat this as the idempotent "already recorded" outcome.
    #[error("duplicate provider transaction id")]
    DuplicateTransaction,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateTransaction => {
                AppError::BadRequest(anyhow!("duplicate provider transaction id"))
            }
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn create_pending(&self, pending: &PendingDonation) -> Result<(), StoreError>;

    /// `pending -> processing`, attaching the provider order id.
    async fn attach_order(&self, pending_id: Uuid, order_id: &str) -> Result<(), StoreError>;

    async fn find_pending(&self, pending_id: Uuid) -> Result<Option<PendingDonation>, StoreError>;

    async fn find_pending_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<PendingDonation>, StoreError>;

    async fn mark_pending_completed(
        &self,
        order_id: &str,
        donation_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn mark_pending_failed(&self, pending_id: Uuid) -> Result<(), StoreError>;

    async fn insert_donation(&self, donation: &Donation) -> Result<(), StoreError>;

    async fn find_donation(&self, id: Uuid) -> Result<Option<Donation>, StoreError>;

    async fn find_donation_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Donation>, StoreError>;

    /// The activation row for a subscription: correlated by subscription id,
    /// distinguished from per-charge rows by the absence of a transaction id.
    async fn find_subscription_donation(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Donation>, StoreError>;

    async fn update_donation(&self, donation: &Donation) -> Result<(), StoreError>;

    /// Metadata-equality update of every donation correlated with the
    /// subscription; returns the number of rows touched.
    async fn update_donations_by_subscription(
        &self,
        subscription_id: &str,
        status: PaymentStatus,
    ) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct MongoDonationStore {
    pending: Collection<PendingDonation>,
    donations: Collection<Donation>,
}

impl MongoDonationStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pending: db.collection("pending_donations"),
            donations: db.collection("donations"),
        }
    }

    /// Initialize indexes. The unique index on `metadata.transaction_id`
    /// enforces at-most-one donation per provider transaction at the storage
    /// layer, closing the race between the idempotency pre-check and insert.
    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let txn_index = IndexModel::builder()
            .keys(doc! { "metadata.transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("unique_transaction_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "metadata.transaction_id": { "$exists": true }
                    })
                    .build(),
            )
            .build();

        let subscription_index = IndexModel::builder()
            .keys(doc! { "metadata.subscription_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("subscription_idx".to_string())
                    .build(),
            )
            .build();

        self.donations
            .create_indexes([txn_index, subscription_index], None)
            .await
            .map_err(to_store_error)?;

        let order_index = IndexModel::builder()
            .keys(doc! { "provider_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("pending_order_idx".to_string())
                    .build(),
            )
            .build();

        self.pending
            .create_indexes([order_index], None)
            .await
            .map_err(to_store_error)?;

        tracing::info!("Donation store indexes initialized");
        Ok(())
    }
}

fn to_store_error(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::DuplicateTransaction
    } else {
        StoreError::Database(anyhow::Error::new(err))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

#[async_trait]
impl DonationStore for MongoDonationStore {
    async fn create_pending(&self, pending: &PendingDonation) -> Result<(), StoreError> {
        self.pending
            .insert_one(pending, None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn attach_order(&self, pending_id: Uuid, order_id: &str) -> Result<(), StoreError> {
        let filter = doc! {
            "_id": pending_id.to_string(),
            "status": PendingStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": PendingStatus::Processing.as_str(),
                "provider_order_id": order_id,
            }
        };
        let result = self
            .pending
            .update_one(filter, update, None)
            .await
            .map_err(to_store_error)?;
        if result.matched_count == 0 {
            return Err(StoreError::Database(anyhow!(
                "pending donation {pending_id} is not in the pending state"
            )));
        }
        Ok(())
    }

    async fn find_pending(&self, pending_id: Uuid) -> Result<Option<PendingDonation>, StoreError> {
        let filter = doc! { "_id": pending_id.to_string() };
        self.pending
            .find_one(filter, None)
            .await
            .map_err(to_store_error)
    }

    async fn find_pending_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<PendingDonation>, StoreError> {
        let filter = doc! { "provider_order_id": order_id };
        self.pending
            .find_one(filter, None)
            .await
            .map_err(to_store_error)
    }

    async fn mark_pending_completed(
        &self,
        order_id: &str,
        donation_id: Uuid,
    ) -> Result<(), StoreError> {
        let filter = doc! { "provider_order_id": order_id };
        let update = doc! {
            "$set": {
                "status": PendingStatus::Completed.as_str(),
                "donation_id": donation_id.to_string(),
            }
        };
        self.pending
            .update_one(filter, update, None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn mark_pending_failed(&self, pending_id: Uuid) -> Result<(), StoreError> {
        let filter = doc! { "_id": pending_id.to_string() };
        let update = doc! { "$set": { "status": PendingStatus::Failed.as_str() } };
        self.pending
            .update_one(filter, update, None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn insert_donation(&self, donation: &Donation) -> Result<(), StoreError> {
        self.donations
            .insert_one(donation, None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn find_donation(&self, id: Uuid) -> Result<Option<Donation>, StoreError> {
        let filter = doc! { "_id": id.to_string() };
        self.donations
            .find_one(filter, None)
            .await
            .map_err(to_store_error)
    }

    async fn find_donation_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Donation>, StoreError> {
        let filter = doc! { "metadata.transaction_id": transaction_id };
        self.donations
            .find_one(filter, None)
            .await
            .map_err(to_store_error)
    }

    async fn find_subscription_donation(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Donation>, StoreError> {
        let filter = doc! {
            "metadata.subscription_id": subscription_id,
            "metadata.transaction_id": { "$exists": false },
        };
        self.donations
            .find_one(filter, None)
            .await
            .map_err(to_store_error)
    }

    async fn update_donation(&self, donation: &Donation) -> Result<(), StoreError> {
        let filter = doc! { "_id": donation.id.to_string() };
        self.donations
            .replace_one(filter, donation, None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn update_donations_by_subscription(
        &self,
        subscription_id: &str,
        status: PaymentStatus,
    ) -> Result<u64, StoreError> {
        let filter = doc! { "metadata.subscription_id": subscription_id };
        let update = doc! {
            "$set": {
                "payment_status": status.as_str(),
                "updated_at": mongodb::bson::DateTime::now(),
            }
        };
        let result = self
            .donations
            .update_many(filter, update, None)
            .await
            .map_err(to_store_error)?;
        Ok(result.modified_count)
    }
}
