use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use crate::errors::AppError;
use crate::models::user::Claims;
use crate::state::AppState;

/// Verifies the caller's bearer JWT and exposes its `Claims` to handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let decoding_key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());

    let token_data = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            AppError::Unauthenticated
        })?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::Unauthenticated);
    }

    // Insert claims into request extensions
    request.extensions_mut().insert(token_data.claims);

    Ok(next.run(request).await)
}
