use mongodb::bson::{self, Bson};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::payment::PaymentConfirmation;

// Every field is optional: a malformed notification must still be acknowledged.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body", default)]
    pub body: Option<CallbackBody>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback", default)]
    pub stk_callback: Option<StkCallback>,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,

    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<Value>,

    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,

    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl CallbackEnvelope {
    /// Extracts `Body.stkCallback`; anything unparseable counts as absent.
    pub fn parse(raw: &[u8]) -> Option<StkCallback> {
        serde_json::from_slice::<CallbackEnvelope>(raw)
            .ok()?
            .body?
            .stk_callback
    }
}

impl StkCallback {
    /// Numeric result code. String codes are not coerced.
    pub fn result_code(&self) -> Option<i64> {
        self.result_code.as_ref().and_then(Value::as_i64)
    }

    /// `ResultCode` as sent, whatever its JSON type.
    pub fn raw_result_code(&self) -> Option<Bson> {
        self.result_code
            .as_ref()
            .and_then(|value| bson::to_bson(value).ok())
    }

    pub fn is_success(&self) -> bool {
        self.result_code() == Some(0)
    }

    pub fn confirmation(&self) -> PaymentConfirmation {
        let items = self
            .callback_metadata
            .as_ref()
            .map(CallbackMetadata::to_map)
            .unwrap_or_default();

        PaymentConfirmation {
            amount: items.get("Amount").and_then(value_as_f64),
            mpesa_receipt_number: items.get("MpesaReceiptNumber").and_then(value_as_string),
            transaction_date: items.get("TransactionDate").and_then(value_as_string),
            phone_number: items.get("PhoneNumber").and_then(value_as_string),
        }
    }
}

impl CallbackMetadata {
    /// Name to value. Items without a value are left out; on repeated names the
    /// first one wins.
    pub fn to_map(&self) -> HashMap<&str, &Value> {
        let mut map = HashMap::with_capacity(self.items.len());
        for item in &self.items {
            if let Some(value) = &item.value {
                map.entry(item.name.as_str()).or_insert(value);
            }
        }
        map
    }
}

fn value_as_string(value: &&Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &&Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Body returned to the gateway for every callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn success() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Success".to_string(),
        }
    }
}
