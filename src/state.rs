use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::PaymentStore;
use crate::errors::{AppError, Result};
use crate::services::mpesa_service::MpesaService;
use crate::services::payment_service::PaymentService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn PaymentStore>,
    pub mpesa_service: Arc<MpesaService>,
    pub payment_service: Arc<PaymentService>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn PaymentStore>) -> Result<Self> {
        let mpesa_service = Arc::new(
            MpesaService::new(config.clone())
                .map_err(|e| AppError::configuration(format!("HTTP client: {}", e)))?,
        );
        let payment_service = Arc::new(PaymentService::new(mpesa_service.clone(), store.clone()));

        Ok(AppState {
            config: Arc::new(config),
            store,
            mpesa_service,
            payment_service,
        })
    }
}
