use async_trait::async_trait;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::payment::{Payment, PaymentResolution, PaymentStatus};

/// Storage for payment records. The store is the only place concurrent
/// requests meet, so the terminal transition must be a conditional write.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with `DuplicateKey` if a record with the same checkout id exists.
    async fn insert_pending(&self, payment: &Payment) -> Result<()>;

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>>;

    /// Lookup restricted to records owned by `user_id`.
    async fn find_owned(&self, checkout_request_id: &str, user_id: &str)
        -> Result<Option<Payment>>;

    /// Applies `resolution` only while the record is still pending. Returns
    /// `false` when no pending record matched.
    async fn resolve_pending(
        &self,
        checkout_request_id: &str,
        resolution: &PaymentResolution,
    ) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct MongoPaymentStore {
    db: Database,
    payments: Collection<Payment>,
}

impl MongoPaymentStore {
    pub const COLLECTION: &'static str = "payments";

    pub async fn open(db: Database) -> Result<Self> {
        let payments: Collection<Payment> = db.collection(Self::COLLECTION);

        let unique_checkout = IndexModel::builder()
            .keys(doc! { "checkout_request_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("checkout_request_id_unique".to_string())
                    .build(),
            )
            .build();
        let owner_lookup = IndexModel::builder()
            .keys(doc! { "checkout_request_id": 1, "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("checkout_request_id_user_id".to_string())
                    .build(),
            )
            .build();

        payments
            .create_indexes(vec![unique_checkout, owner_lookup])
            .await?;
        info!(collection = Self::COLLECTION, "Payment indexes ensured");

        Ok(MongoPaymentStore { db, payments })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert_pending(&self, payment: &Payment) -> Result<()> {
        match self.payments.insert_one(payment).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(AppError::DuplicateKey(payment.checkout_request_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>> {
        let filter = doc! { "checkout_request_id": checkout_request_id };
        Ok(self.payments.find_one(filter).await?)
    }

    async fn find_owned(
        &self,
        checkout_request_id: &str,
        user_id: &str,
    ) -> Result<Option<Payment>> {
        let filter = doc! {
            "checkout_request_id": checkout_request_id,
            "user_id": user_id,
        };
        Ok(self.payments.find_one(filter).await?)
    }

    async fn resolve_pending(
        &self,
        checkout_request_id: &str,
        resolution: &PaymentResolution,
    ) -> Result<bool> {
        let filter = doc! {
            "checkout_request_id": checkout_request_id,
            "status": PaymentStatus::Pending.as_str(),
        };
        let update = doc! { "$set": resolution.to_set_document() };

        let result = self.payments.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
