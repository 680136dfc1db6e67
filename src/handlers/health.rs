use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

pub async fn root_handler() -> &'static str {
    "Rent payment relay"
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let (status, db_status) = match state.store.ping().await {
        Ok(_) => ("healthy", "connected"),
        Err(e) => {
            warn!(error = %e, "Payment store ping failed");
            ("degraded", "disconnected")
        }
    };

    Json(json!({
        "status": status,
        "database": db_status,
        "mpesa": state.config.mpesa_environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn mpesa_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "mpesa",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.config.get_config_info(),
        "features": ["stk-push", "callback", "payment-status-check"]
    }))
}
