use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::database::payment_store::PaymentStore;
use crate::errors::{AppError, Result};
use crate::models::payment::{Payment, PaymentResolution};

/// `PaymentStore` held in process memory, keyed by checkout request id.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<String, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_pending(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.checkout_request_id) {
            return Err(AppError::DuplicateKey(payment.checkout_request_id.clone()));
        }
        payments.insert(payment.checkout_request_id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(checkout_request_id).cloned())
    }

    async fn find_owned(
        &self,
        checkout_request_id: &str,
        user_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .get(checkout_request_id)
            .filter(|payment| payment.user_id == user_id)
            .cloned())
    }

    async fn resolve_pending(
        &self,
        checkout_request_id: &str,
        resolution: &PaymentResolution,
    ) -> Result<bool> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(checkout_request_id) {
            Some(payment) if !payment.status.is_terminal() => {
                payment.apply(resolution);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
