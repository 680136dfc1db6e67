use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "phoneNumber is required"))]
    pub phone_number: String,

    // Fractions are floored before submission.
    #[serde(default)]
    #[validate(required(message = "amount is required"))]
    pub amount: Option<f64>,

    #[serde(default)]
    #[validate(length(min = 1, message = "roomNumber is required"))]
    pub room_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    #[serde(rename = "checkoutRequestID", skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "merchantRequestID", skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentStatusRequest {
    #[serde(rename = "checkoutRequestID", default)]
    #[validate(length(min = 1, message = "checkoutRequestID is required"))]
    pub checkout_request_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    /// `pending`, `completed`, `failed` or `not_found`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
}

impl PaymentStatusResponse {
    pub fn not_found() -> Self {
        PaymentStatusResponse {
            status: "not_found".to_string(),
            mpesa_receipt_number: None,
            amount: None,
            result_desc: None,
        }
    }
}
