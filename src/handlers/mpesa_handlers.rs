// handlers/mpesa_handlers.rs
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use tracing::info;

use crate::dtos::payment_dtos::{
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentStatusRequest, PaymentStatusResponse,
};
use crate::errors::Result;
use crate::models::mpesa_callback::CallbackAck;
use crate::models::user::Claims;
use crate::state::AppState;

// C2B Handlers
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: std::result::Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>> {
    let Json(request) = payload?;
    info!(user_id = %claims.sub, room_number = %request.room_number, "Received STK push request");

    let response = state.payment_service.initiate(&claims.sub, request).await?;
    Ok(Json(response))
}

/// Provider-facing: the gateway always gets `{ResultCode: 0}` so it stops
/// redelivering, whatever happened here.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    info!(payload = %String::from_utf8_lossy(&body), "M-Pesa callback received");

    let outcome = state.payment_service.reconcile(&body).await;
    info!(outcome = ?outcome, "M-Pesa callback handled");

    Json(CallbackAck::success())
}

pub async fn check_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: std::result::Result<Json<PaymentStatusRequest>, JsonRejection>,
) -> Result<Json<PaymentStatusResponse>> {
    let Json(request) = payload?;

    let response = state.payment_service.check_status(&claims.sub, request).await?;
    Ok(Json(response))
}
