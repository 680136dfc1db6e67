use mongodb::{Client, Database};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, StoreBackend};
use crate::database::{InMemoryPaymentStore, MongoPaymentStore, PaymentStore};
use crate::errors::{AppError, Result};

pub async fn get_db_client(config: &AppConfig) -> Result<Database> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::configuration("DATABASE_URL must be set"))?;

    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(&config.database_name);

    // Fail at startup rather than on the first payment.
    let collections = db.list_collection_names().await?;
    info!(
        database = %config.database_name,
        collections = ?collections,
        "Connected to MongoDB"
    );
    if !collections.iter().any(|c| c == MongoPaymentStore::COLLECTION) {
        info!(
            collection = MongoPaymentStore::COLLECTION,
            "Collection not found, it will be created on first insert"
        );
    }

    Ok(db)
}

/// Opens the store selected by `PAYMENT_STORE`.
pub async fn open_payment_store(config: &AppConfig) -> Result<Arc<dyn PaymentStore>> {
    match config.payment_store {
        StoreBackend::Mongo => {
            let db = get_db_client(config).await?;
            Ok(Arc::new(MongoPaymentStore::open(db).await?))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory payment store, records are lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}
