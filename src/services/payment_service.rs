// services/payment_service.rs
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

use crate::database::PaymentStore;
use crate::dtos::payment_dtos::{
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentStatusRequest, PaymentStatusResponse,
};
use crate::errors::{AppError, Result};
use crate::models::mpesa_callback::CallbackEnvelope;
use crate::models::payment::{
    account_reference, NewPayment, Payment, PaymentResolution, PaymentStatus,
};
use crate::services::mpesa_service::{MpesaError, MpesaService, StkPushOrder};

/// What a callback did to the store. The gateway is acknowledged the same way
/// in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No `Body.stkCallback` in the payload.
    Empty,
    MissingCheckoutId,
    UnknownCheckout(String),
    /// Record was already terminal; nothing written.
    AlreadyResolved(String),
    Completed(String),
    Failed(String),
    Errored(String),
}

pub struct PaymentService {
    mpesa: Arc<MpesaService>,
    store: Arc<dyn PaymentStore>,
}

impl PaymentService {
    pub fn new(mpesa: Arc<MpesaService>, store: Arc<dyn PaymentStore>) -> Self {
        PaymentService { mpesa, store }
    }

    pub async fn initiate(
        &self,
        user_id: &str,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse> {
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated);
        }
        request.validate()?;

        let amount = request
            .amount
            .filter(|amount| amount.is_finite())
            .map(f64::floor)
            .filter(|amount| *amount >= 1.0 && *amount <= i64::MAX as f64)
            .ok_or_else(|| AppError::invalid_argument("amount must be at least 1"))?
            as i64;

        let order = StkPushOrder {
            phone_number: MpesaService::format_phone_number(&request.phone_number),
            amount,
            account_reference: account_reference(&request.room_number),
        };

        let response = self
            .mpesa
            .initiate_stk_push(&order)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "STK push error");
                AppError::internal(upstream_message(e))
            })?;

        let accepted = response.is_accepted();
        let message = response.message();

        if accepted {
            let checkout_request_id = response
                .checkout_request_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    AppError::internal("M-Pesa accepted the request without a CheckoutRequestID")
                })?;

            let payment = Payment::pending(NewPayment {
                user_id: user_id.to_string(),
                room_number: request.room_number,
                amount,
                phone_number: order.phone_number,
                checkout_request_id: checkout_request_id.clone(),
                merchant_request_id: response.merchant_request_id.clone(),
                response_description: response.response_description.clone(),
            });
            self.store.insert_pending(&payment).await?;

            info!(
                user_id = %user_id,
                checkout_request_id = %checkout_request_id,
                amount,
                "Pending payment recorded"
            );
        } else {
            warn!(
                user_id = %user_id,
                response_code = ?response.response_code,
                description = %message,
                "STK push not accepted, nothing recorded"
            );
        }

        Ok(InitiatePaymentResponse {
            success: accepted,
            checkout_request_id: response.checkout_request_id,
            merchant_request_id: response.merchant_request_id,
            message,
        })
    }

    /// Applies a gateway callback. Never fails: errors are logged and reported
    /// as `Errored`.
    pub async fn reconcile(&self, raw: &[u8]) -> ReconcileOutcome {
        match self.try_reconcile(raw).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Callback reconciliation failed");
                ReconcileOutcome::Errored(e.to_string())
            }
        }
    }

    async fn try_reconcile(&self, raw: &[u8]) -> Result<ReconcileOutcome> {
        let Some(callback) = CallbackEnvelope::parse(raw) else {
            warn!("Callback without Body.stkCallback, ignoring");
            return Ok(ReconcileOutcome::Empty);
        };

        let Some(checkout_request_id) = callback
            .checkout_request_id
            .clone()
            .filter(|id| !id.is_empty())
        else {
            warn!("Callback without CheckoutRequestID, ignoring");
            return Ok(ReconcileOutcome::MissingCheckoutId);
        };

        let Some(payment) = self.store.find_by_checkout_id(&checkout_request_id).await? else {
            info!(checkout_request_id = %checkout_request_id, "No payment found for callback");
            return Ok(ReconcileOutcome::UnknownCheckout(checkout_request_id));
        };

        if payment.status.is_terminal() {
            info!(
                checkout_request_id = %checkout_request_id,
                status = payment.status.as_str(),
                "Duplicate callback for resolved payment"
            );
            return Ok(ReconcileOutcome::AlreadyResolved(checkout_request_id));
        }

        let result_code = callback.result_code();
        let resolution = if callback.is_success() {
            PaymentResolution::completed(
                result_code,
                callback.result_desc.clone(),
                callback.confirmation(),
            )
        } else {
            PaymentResolution::failed(result_code, callback.result_desc.clone())
        }
        .with_raw_result_code(callback.raw_result_code());

        // A concurrent delivery may have resolved it since the read above.
        if !self
            .store
            .resolve_pending(&checkout_request_id, &resolution)
            .await?
        {
            info!(
                checkout_request_id = %checkout_request_id,
                "Payment resolved by a concurrent callback"
            );
            return Ok(ReconcileOutcome::AlreadyResolved(checkout_request_id));
        }

        let receipt = resolution
            .confirmation
            .as_ref()
            .and_then(|c| c.mpesa_receipt_number.as_deref());
        info!(
            checkout_request_id = %checkout_request_id,
            status = resolution.status.as_str(),
            result_code = ?result_code,
            receipt = ?receipt,
            "Payment updated"
        );

        Ok(if resolution.status == PaymentStatus::Completed {
            ReconcileOutcome::Completed(checkout_request_id)
        } else {
            ReconcileOutcome::Failed(checkout_request_id)
        })
    }

    pub async fn check_status(
        &self,
        user_id: &str,
        request: PaymentStatusRequest,
    ) -> Result<PaymentStatusResponse> {
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated);
        }
        request.validate()?;

        let payment = self
            .store
            .find_owned(&request.checkout_request_id, user_id)
            .await?;

        Ok(match payment {
            Some(payment) => PaymentStatusResponse {
                status: payment.status.as_str().to_string(),
                mpesa_receipt_number: payment.mpesa_receipt_number,
                amount: Some(payment.amount),
                result_desc: payment.result_desc,
            },
            None => PaymentStatusResponse::not_found(),
        })
    }
}

fn upstream_message(err: MpesaError) -> String {
    match err {
        MpesaError::Rejected { message, .. } => message,
        other => other.to_string(),
    }
}
