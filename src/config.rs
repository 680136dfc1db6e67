// config.rs
use chrono::FixedOffset;
use std::env;

use crate::errors::{AppError, Result};

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Where payment records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    /// Process-local store, lost on restart. Local development only.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_short_code: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub mpesa_environment: String,
    pub mpesa_base_url: String,
    pub mpesa_timestamp_offset: FixedOffset,
    pub mpesa_transaction_desc: String,
    pub jwt_secret: String,
    pub payment_store: StoreBackend,
    pub database_url: Option<String>,
    pub database_name: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    /// Reads the process environment. `main` loads `.env` before calling this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. `from_env` is the
    /// process-environment flavour of this.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };

        let mpesa_environment =
            optional("MPESA_ENVIRONMENT").unwrap_or_else(|| "sandbox".to_string());

        let mpesa_base_url = match optional("MPESA_BASE_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if mpesa_environment == "production" => PRODUCTION_BASE_URL.to_string(),
            None => SANDBOX_BASE_URL.to_string(),
        };

        let offset_minutes: i32 = optional("MPESA_TIMESTAMP_OFFSET_MINUTES")
            .map(|raw| {
                raw.trim().parse::<i32>().map_err(|_| {
                    AppError::configuration("MPESA_TIMESTAMP_OFFSET_MINUTES must be a number")
                })
            })
            .transpose()?
            .unwrap_or(0);
        let mpesa_timestamp_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::configuration("MPESA_TIMESTAMP_OFFSET_MINUTES is out of range")
        })?;

        let payment_store = match optional("PAYMENT_STORE").as_deref() {
            None | Some("mongo") => StoreBackend::Mongo,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "PAYMENT_STORE must be 'mongo' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let database_url = optional("DATABASE_URL");
        if payment_store == StoreBackend::Mongo && database_url.is_none() {
            return Err(AppError::configuration("DATABASE_URL must be set"));
        }

        let port = match optional("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AppError::configuration("PORT must be a number"))?,
            None => 3000,
        };

        Ok(AppConfig {
            mpesa_consumer_key: required("MPESA_CONSUMER_KEY")?,
            mpesa_consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            mpesa_short_code: required("MPESA_SHORT_CODE")?,
            mpesa_passkey: required("MPESA_PASSKEY")?,
            mpesa_callback_url: required("MPESA_CALLBACK_URL")?,
            mpesa_environment,
            mpesa_base_url,
            mpesa_timestamp_offset,
            mpesa_transaction_desc: optional("MPESA_TRANSACTION_DESC")
                .unwrap_or_else(|| "Rent payment".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            payment_store,
            database_url,
            database_name: optional("DATABASE_NAME").unwrap_or_else(|| "rentpay".to_string()),
            port,
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        })
    }

    /// Token and STK push endpoints, in that order.
    pub fn get_mpesa_urls(&self) -> (String, String) {
        let auth_url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.mpesa_base_url
        );
        let stk_url = format!("{}/mpesa/stkpush/v1/processrequest", self.mpesa_base_url);

        (auth_url, stk_url)
    }

    pub fn is_production(&self) -> bool {
        self.mpesa_environment == "production"
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.mpesa_environment,
            "is_production": self.is_production(),
            "base_url": self.mpesa_base_url,
            "business_shortcode": self.mpesa_short_code,
            "callback_url": self.mpesa_callback_url,
            "timestamp_offset_minutes": self.mpesa_timestamp_offset.local_minus_utc() / 60,
            "consumer_key_set": !self.mpesa_consumer_key.is_empty(),
            "consumer_secret_set": !self.mpesa_consumer_secret.is_empty(),
            "passkey_set": !self.mpesa_passkey.is_empty(),
            "payment_store": match self.payment_store {
                StoreBackend::Mongo => "mongo",
                StoreBackend::Memory => "memory",
            },
            "port": self.port,
            "host": self.host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
            ("MPESA_SHORT_CODE", "174379"),
            ("MPESA_PASSKEY", "passkey"),
            ("MPESA_CALLBACK_URL", "https://relay.example.com/api/mpesa/callback"),
            ("JWT_SECRET", "jwt"),
            ("DATABASE_URL", "mongodb://localhost:27017"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_to_sandbox_and_mongo() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.mpesa_base_url, SANDBOX_BASE_URL);
        assert_eq!(config.payment_store, StoreBackend::Mongo);
        assert_eq!(config.mpesa_timestamp_offset.local_minus_utc(), 0);
        assert_eq!(config.mpesa_transaction_desc, "Rent payment");
        assert_eq!(config.database_name, "rentpay");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn production_environment_switches_base_url() {
        let mut vars = base_vars();
        vars.insert("MPESA_ENVIRONMENT", "production");

        let config = load(&vars).unwrap();
        assert!(config.is_production());
        assert_eq!(
            config.get_mpesa_urls().0,
            "https://api.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
    }

    #[test]
    fn explicit_base_url_wins() {
        let mut vars = base_vars();
        vars.insert("MPESA_BASE_URL", "http://127.0.0.1:9000/");

        let config = load(&vars).unwrap();
        assert_eq!(
            config.get_mpesa_urls().1,
            "http://127.0.0.1:9000/mpesa/stkpush/v1/processrequest"
        );
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let mut vars = base_vars();
        vars.remove("MPESA_PASSKEY");

        match load(&vars) {
            Err(AppError::ConfigurationError(msg)) => assert!(msg.contains("MPESA_PASSKEY")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn memory_store_does_not_need_database_url() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");
        vars.insert("PAYMENT_STORE", "memory");

        let config = load(&vars).unwrap();
        assert_eq!(config.payment_store, StoreBackend::Memory);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn timestamp_offset_is_parsed_in_minutes() {
        let mut vars = base_vars();
        vars.insert("MPESA_TIMESTAMP_OFFSET_MINUTES", "180");

        let config = load(&vars).unwrap();
        assert_eq!(config.mpesa_timestamp_offset.local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn config_info_never_exposes_secrets() {
        let config = load(&base_vars()).unwrap();
        let info = config.get_config_info().to_string();

        assert!(!info.contains("\"secret\""));
        assert!(!info.contains("\"passkey\""));
        assert!(info.contains("consumer_secret_set"));
    }
}
