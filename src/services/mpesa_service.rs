// services/mpesa_service.rs
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::config::AppConfig;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const STK_PUSH_TIMEOUT: Duration = Duration::from_secs(15);
const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

#[derive(Error, Debug)]
pub enum MpesaError {
    #[error("M-Pesa authentication failed: {0}")]
    AuthFailure(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("M-Pesa rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from M-Pesa: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<Value>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

impl StkPushResponse {
    /// The gateway accepts a push only with the string code `"0"`.
    pub fn is_accepted(&self) -> bool {
        matches!(&self.response_code, Some(Value::String(code)) if code == "0")
    }

    pub fn message(&self) -> String {
        self.response_description
            .clone()
            .or_else(|| self.customer_message.clone())
            .unwrap_or_default()
    }
}

/// What to charge, before signing.
#[derive(Debug, Clone)]
pub struct StkPushOrder {
    pub phone_number: String,
    pub amount: i64,
    pub account_reference: String,
}

#[derive(Debug, Clone)]
pub struct MpesaService {
    config: AppConfig,
    client: Client,
}

impl MpesaService {
    pub fn new(config: AppConfig) -> Result<Self, MpesaError> {
        let client = Client::builder().build()?;

        Ok(MpesaService { config, client })
    }

    /// Normalises Kenyan MSISDNs to `2547XXXXXXXX`. Unknown shapes pass
    /// through; the gateway rejects them.
    pub fn format_phone_number(phone: &str) -> String {
        let phone = phone.trim().trim_start_matches('+');
        if phone.starts_with("254") && phone.len() == 12 {
            return phone.to_string();
        }
        if phone.starts_with('0') && phone.len() == 10 {
            return format!("254{}", &phone[1..]);
        }
        if (phone.starts_with('7') || phone.starts_with('1')) && phone.len() == 9 {
            return format!("254{}", phone);
        }
        phone.to_string()
    }

    /// `YYYYMMDDHHmmss` in the configured gateway offset.
    pub fn generate_timestamp(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.config.mpesa_timestamp_offset)
            .format("%Y%m%d%H%M%S")
            .to_string()
    }

    pub fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.mpesa_short_code, self.config.mpesa_passkey, timestamp
        );
        base64.encode(password_string)
    }

    /// Fetches a fresh bearer token. Not cached.
    pub async fn get_access_token(&self) -> Result<String, MpesaError> {
        info!("Requesting M-Pesa access token");
        let auth_string = format!(
            "{}:{}",
            self.config.mpesa_consumer_key, self.config.mpesa_consumer_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let (auth_url, _) = self.config.get_mpesa_urls();

        let response = self
            .client
            .get(&auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|e| MpesaError::AuthFailure(e.to_string()))?;

        let auth_response: AuthResponse = read_json(response).await.map_err(|e| {
            error!(error = %e, "Failed to get access token");
            match e {
                MpesaError::Rejected { message, .. } => MpesaError::AuthFailure(message),
                other => MpesaError::AuthFailure(other.to_string()),
            }
        })?;

        auth_response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| MpesaError::AuthFailure("response has no access_token".to_string()))
    }

    pub fn build_stk_request(&self, order: &StkPushOrder, now: DateTime<Utc>) -> StkPushRequest {
        let timestamp = self.generate_timestamp(now);
        let password = self.generate_password(&timestamp);

        StkPushRequest {
            business_short_code: self.config.mpesa_short_code.clone(),
            password,
            timestamp,
            transaction_type: TRANSACTION_TYPE.to_string(),
            amount: order.amount,
            party_a: order.phone_number.clone(),
            party_b: self.config.mpesa_short_code.clone(),
            phone_number: order.phone_number.clone(),
            callback_url: self.config.mpesa_callback_url.clone(),
            account_reference: order.account_reference.clone(),
            transaction_desc: self.config.mpesa_transaction_desc.clone(),
        }
    }

    // C2B: Customer to Business
    pub async fn initiate_stk_push(
        &self,
        order: &StkPushOrder,
    ) -> Result<StkPushResponse, MpesaError> {
        info!(
            phone = %order.phone_number,
            amount = order.amount,
            account_reference = %order.account_reference,
            "Submitting STK push"
        );

        let access_token = self.get_access_token().await?;
        let stk_request = self.build_stk_request(order, Utc::now());
        let (_, stk_url) = self.config.get_mpesa_urls();

        let response = self
            .client
            .post(&stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&stk_request)
            .timeout(STK_PUSH_TIMEOUT)
            .send()
            .await?;

        let stk_response: StkPushResponse = read_json(response).await.map_err(|e| {
            error!(error = %e, "STK push failed");
            e
        })?;

        info!(
            checkout_request_id = ?stk_response.checkout_request_id,
            response_code = ?stk_response.response_code,
            "STK push response received"
        );
        Ok(stk_response)
    }
}

/// Decodes a success body, or turns an error body into `Rejected` carrying the
/// gateway's `errorMessage` when it sent one.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, MpesaError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(MpesaError::Rejected {
            status: status.as_u16(),
            message: upstream_error_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| MpesaError::Decode(e.to_string()))
}

fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(base_url: &str, offset_minutes: &str) -> AppConfig {
        let vars = HashMap::from([
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
            ("MPESA_SHORT_CODE", "174379"),
            ("MPESA_PASSKEY", "passkey"),
            ("MPESA_CALLBACK_URL", "https://relay.example.com/api/mpesa/callback"),
            ("MPESA_BASE_URL", base_url),
            ("MPESA_TIMESTAMP_OFFSET_MINUTES", offset_minutes),
            ("JWT_SECRET", "jwt"),
            ("PAYMENT_STORE", "memory"),
        ]);
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    fn order() -> StkPushOrder {
        StkPushOrder {
            phone_number: "254712345678".into(),
            amount: 500,
            account_reference: "RENT-12B".into(),
        }
    }

    #[test]
    fn formats_phone_numbers() {
        assert_eq!(MpesaService::format_phone_number("254712345678"), "254712345678");
        assert_eq!(MpesaService::format_phone_number("+254712345678"), "254712345678");
        assert_eq!(MpesaService::format_phone_number("0712345678"), "254712345678");
        assert_eq!(MpesaService::format_phone_number("712345678"), "254712345678");
        assert_eq!(MpesaService::format_phone_number(" 0110345678 "), "254110345678");
        assert_eq!(MpesaService::format_phone_number("12345"), "12345");
    }

    #[test]
    fn timestamp_and_password_agree() {
        let service = MpesaService::new(config("http://localhost", "0")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 7).unwrap();

        let request = service.build_stk_request(&order(), now);
        assert_eq!(request.timestamp, "20240101090507");

        let decoded = base64.decode(&request.password).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "174379passkey20240101090507"
        );
        assert_eq!(request.party_b, "174379");
        assert_eq!(request.transaction_type, "CustomerPayBillOnline");
        assert_eq!(request.transaction_desc, "Rent payment");
    }

    #[test]
    fn timestamp_uses_configured_offset() {
        let service = MpesaService::new(config("http://localhost", "180")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 22, 30, 0).unwrap();

        assert_eq!(service.generate_timestamp(now), "20240102013000");
    }

    #[test]
    fn only_string_zero_is_accepted() {
        let accepted: StkPushResponse =
            serde_json::from_value(json!({ "ResponseCode": "0" })).unwrap();
        let numeric: StkPushResponse =
            serde_json::from_value(json!({ "ResponseCode": 0 })).unwrap();
        let rejected: StkPushResponse =
            serde_json::from_value(json!({ "ResponseCode": "1", "CustomerMessage": "Try later" }))
                .unwrap();

        assert!(accepted.is_accepted());
        assert!(!numeric.is_accepted());
        assert!(!rejected.is_accepted());
        assert_eq!(rejected.message(), "Try later");
    }

    #[tokio::test]
    async fn fetches_access_token_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::UrlEncoded(
                "grant_type".into(),
                "client_credentials".into(),
            ))
            .match_header("authorization", "Basic a2V5OnNlY3JldA==")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"test-token","expires_in":"3599"}"#)
            .create_async()
            .await;

        let service = MpesaService::new(config(&server.url(), "0")).unwrap();
        let token = service.get_access_token().await.unwrap();

        assert_eq!(token, "test-token");
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn token_failure_carries_upstream_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(
                json!({
                    "errorCode": "400.008.01",
                    "errorMessage": "Invalid Authentication passed"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let service = MpesaService::new(config(&server.url(), "0")).unwrap();
        match service.get_access_token().await {
            Err(MpesaError::AuthFailure(message)) => {
                assert_eq!(message, "Invalid Authentication passed")
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn token_response_without_token_is_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let service = MpesaService::new(config(&server.url(), "0")).unwrap();
        assert!(matches!(
            service.get_access_token().await,
            Err(MpesaError::AuthFailure(_))
        ));
    }

    #[tokio::test]
    async fn submits_signed_stk_push() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"access_token":"test-token"}"#)
            .create_async()
            .await;
        let push_mock = server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({
                "BusinessShortCode": "174379",
                "TransactionType": "CustomerPayBillOnline",
                "Amount": 500,
                "PartyA": "254712345678",
                "PartyB": "174379",
                "PhoneNumber": "254712345678",
                "CallBackURL": "https://relay.example.com/api/mpesa/callback",
                "AccountReference": "RENT-12B",
                "TransactionDesc": "Rent payment"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResponseCode": "0",
                    "ResponseDescription": "Success. Request accepted for processing",
                    "CustomerMessage": "Success. Request accepted for processing"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let service = MpesaService::new(config(&server.url(), "0")).unwrap();
        let response = service.initiate_stk_push(&order()).await.unwrap();

        assert!(response.is_accepted());
        assert_eq!(
            response.checkout_request_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
        push_mock.assert_async().await;
    }

    #[tokio::test]
    async fn gateway_error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"access_token":"test-token"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .with_status(400)
            .with_body(
                json!({
                    "requestId": "1",
                    "errorCode": "400.002.02",
                    "errorMessage": "Bad Request - Invalid PhoneNumber"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let service = MpesaService::new(config(&server.url(), "0")).unwrap();
        match service.initiate_stk_push(&order()).await {
            Err(MpesaError::Rejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Bad Request - Invalid PhoneNumber");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
