use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::{
    AppState,
    errors::AppError,
    models::{Claims, CurrentUser},
    utils::decode_jwt,
};

/// Pull the bearer token out of an `Authorization` header value.
fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authentication middleware validating JWT access tokens.
///
/// On success the request carries a [`CurrentUser`] extension with the role
/// read fresh from the database, so deactivation and role changes take effect
/// before the token expires.
///
/// # Errors
/// Returns unauthorized if the token is missing, invalid, a refresh token, or
/// belongs to a deactivated account; rate-limited when the caller exceeds quota.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or(AppError::Unauthorized)?;
    let claims: Claims = decode_jwt(token, &state.config)?;
    if claims.refresh {
        return Err(AppError::Unauthorized);
    }
    let user_id = claims.sub;

    if state.rate_limiter.check_key(&user_id.to_string()).is_err() {
        tracing::warn!(%user_id, "rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    let row = sqlx::query_as::<_, (crate::models::Role, bool)>(
        "SELECT role, is_active FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?;

    let Some((role, true)) = row else {
        return Err(AppError::Unauthorized);
    };

    req.extensions_mut().insert(CurrentUser { id: user_id, role });

    Ok(next.run(req).await)
}
