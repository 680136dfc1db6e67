use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// One STK push attempt, keyed by the gateway's checkout request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub user_id: String,
    pub room_number: String,
    pub account_reference: String,
    pub amount: i64,
    pub phone_number: String,

    pub checkout_request_id: String,
    #[serde(default)]
    pub merchant_request_id: Option<String>,
    #[serde(default)]
    pub response_description: Option<String>,

    pub status: PaymentStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,

    // Populated by the callback
    #[serde(default)]
    pub callback_received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_received_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result_code: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

pub struct NewPayment {
    pub user_id: String,
    pub room_number: String,
    pub amount: i64,
    pub phone_number: String,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub response_description: Option<String>,
}

impl Payment {
    pub fn pending(new: NewPayment) -> Self {
        let now = DateTime::now();
        Payment {
            id: Some(ObjectId::new()),
            account_reference: account_reference(&new.room_number),
            user_id: new.user_id,
            room_number: new.room_number,
            amount: new.amount,
            phone_number: new.phone_number,
            checkout_request_id: new.checkout_request_id,
            merchant_request_id: new.merchant_request_id,
            response_description: new.response_description,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            callback_received: false,
            callback_received_at: None,
            result_code: None,
            raw_result_code: None,
            result_desc: None,
            mpesa_receipt_number: None,
            transaction_date: None,
            confirmed_amount: None,
            confirmed_phone: None,
            completed_at: None,
        }
    }

    /// In-place version of `PaymentResolution::to_set_document`.
    pub fn apply(&mut self, resolution: &PaymentResolution) {
        self.status = resolution.status;
        self.callback_received = true;
        self.callback_received_at = Some(resolution.received_at);
        self.updated_at = resolution.received_at;
        self.result_code = resolution.result_code;
        self.raw_result_code = resolution.raw_result_code.clone();
        self.result_desc = resolution.result_desc.clone();

        if let Some(confirmation) = &resolution.confirmation {
            self.mpesa_receipt_number = confirmation.mpesa_receipt_number.clone();
            self.transaction_date = confirmation.transaction_date.clone();
            self.confirmed_amount = confirmation.amount;
            self.confirmed_phone = confirmation.phone_number.clone();
            self.completed_at = Some(resolution.received_at);
        }
    }
}

pub fn account_reference(room_number: &str) -> String {
    format!("RENT-{}", room_number)
}

/// Fields confirmed by a successful callback. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentConfirmation {
    pub amount: Option<f64>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

/// Terminal transition for a pending payment.
#[derive(Debug, Clone)]
pub struct PaymentResolution {
    pub status: PaymentStatus,
    pub result_code: Option<i64>,
    /// `ResultCode` exactly as the gateway sent it.
    pub raw_result_code: Option<Bson>,
    pub result_desc: Option<String>,
    pub confirmation: Option<PaymentConfirmation>,
    pub received_at: DateTime,
}

impl PaymentResolution {
    pub fn completed(
        result_code: Option<i64>,
        result_desc: Option<String>,
        confirmation: PaymentConfirmation,
    ) -> Self {
        PaymentResolution {
            status: PaymentStatus::Completed,
            raw_result_code: result_code.map(Bson::Int64),
            result_code,
            result_desc,
            confirmation: Some(confirmation),
            received_at: DateTime::now(),
        }
    }

    pub fn failed(result_code: Option<i64>, result_desc: Option<String>) -> Self {
        PaymentResolution {
            status: PaymentStatus::Failed,
            raw_result_code: result_code.map(Bson::Int64),
            result_code,
            result_desc,
            confirmation: None,
            received_at: DateTime::now(),
        }
    }

    pub fn with_raw_result_code(mut self, raw: Option<Bson>) -> Self {
        self.raw_result_code = raw;
        self
    }

    pub fn to_set_document(&self) -> Document {
        let mut set = doc! {
            "status": self.status.as_str(),
            "callback_received": true,
            "callback_received_at": self.received_at,
            "updated_at": self.received_at,
            "result_code": self.result_code.map(Bson::Int64).unwrap_or(Bson::Null),
            "raw_result_code": self.raw_result_code.clone().unwrap_or(Bson::Null),
            "result_desc": self.result_desc.clone().map(Bson::String).unwrap_or(Bson::Null),
        };

        if let Some(confirmation) = &self.confirmation {
            set.insert("mpesa_receipt_number", optional_string(&confirmation.mpesa_receipt_number));
            set.insert("transaction_date", optional_string(&confirmation.transaction_date));
            set.insert(
                "confirmed_amount",
                confirmation.amount.map(Bson::Double).unwrap_or(Bson::Null),
            );
            set.insert("confirmed_phone", optional_string(&confirmation.phone_number));
            set.insert("completed_at", self.received_at);
        }

        set
    }
}

fn optional_string(value: &Option<String>) -> Bson {
    value.clone().map(Bson::String).unwrap_or(Bson::Null)
}
