use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{health, mpesa_handlers};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn mpesa_routes(state: AppState) -> Router<AppState> {
    // Caller-facing, JWT required
    let authenticated = Router::new()
        .route("/stk-push", post(mpesa_handlers::initiate_stk_push))
        .route("/check-payment-status", post(mpesa_handlers::check_payment_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/health", get(health::mpesa_health))
        // Gateway-facing, unauthenticated. Must be acknowledged whatever its size.
        .route(
            "/callback",
            post(mpesa_handlers::mpesa_callback).layer(DefaultBodyLimit::disable()),
        )
        .merge(authenticated)
}
