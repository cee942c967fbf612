use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    activity::{ActivityType, log_activity},
    errors::{AppError, AppResult},
    models::{
        ChangePasswordRequest, CurrentUser, LoginRequest, PasswordResetConfirm,
        PasswordResetRequest, RefreshRequest, RegisterRequest, Role, TokenResponse,
        UpdateProfileRequest, User, UserResponse,
    },
    utils::{create_jwt_tokens, decode_jwt, generate_token, hash_password, verify_password},
};

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, full_name, phone, password_hash, role, is_active, created_at";

/// Register a new Member account.
///
/// # Errors
/// Returns validation errors, conflict on duplicate username/email, or database errors.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;

    let mut tx = state.db.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, username, email, full_name, phone, password_hash, role)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&payload.full_name)
    .bind(&payload.phone)
    .bind(&password_hash)
    .bind(Role::Member)
    .fetch_one(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(user.id),
        ActivityType::Register,
        &format!("New member registered: {}", user.username),
    )
    .await?;
    tx.commit().await?;

    info!(user_id = %user.id, "member registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Authenticate a user and return JWT tokens.
///
/// # Errors
/// Returns validation, invalid credentials, inactive account, or database errors.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1)"
    ))
    .bind(&payload.username)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AppError::AccountInactive);
    }

    log_activity(
        &state.db,
        Some(user.id),
        ActivityType::Login,
        &format!("User logged in: {}", user.username),
    )
    .await?;

    let (access, refresh) = create_jwt_tokens(user.id, user.role, &state.config)?;
    Ok(Json(TokenResponse {
        access_token: access,
        refresh_token: refresh,
    }))
}

/// Exchange a refresh token for a new token pair.
///
/// # Errors
/// Returns unauthorized for access tokens, invalid tokens, or deactivated accounts.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let claims = decode_jwt(&body.refresh_token, &state.config)?;
    if !claims.refresh {
        return Err(AppError::Unauthorized);
    }

    let (role, is_active) = sqlx::query_as::<_, (Role, bool)>("SELECT role, is_active FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !is_active {
        return Err(AppError::Unauthorized);
    }

    let (access, refresh) = create_jwt_tokens(claims.sub, role, &state.config)?;
    Ok(Json(TokenResponse {
        access_token: access,
        refresh_token: refresh,
    }))
}

/// Profile of the authenticated user.
///
/// # Errors
/// Returns not found or database errors.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<UserResponse>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(current.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

/// Update the caller's email, name and phone.
///
/// # Errors
/// Returns validation, conflict, or database errors.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    payload.validate()?;

    let mut tx = state.db.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET email = $2, full_name = $3, phone = $4 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(current.id)
    .bind(&payload.email)
    .bind(&payload.full_name)
    .bind(&payload.phone)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    log_activity(&mut *tx, Some(current.id), ActivityType::Update, "User updated profile").await?;
    tx.commit().await?;

    Ok(Json(user.into()))
}

/// Change the caller's password after verifying the current one.
///
/// # Errors
/// Returns invalid credentials when the current password does not match.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    payload.validate()?;

    let current_hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
        .bind(current.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    if !verify_password(&payload.current_password, &current_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let new_hash = hash_password(&payload.new_password)?;
    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(current.id)
        .bind(&new_hash)
        .execute(&mut *tx)
        .await?;
    log_activity(&mut *tx, Some(current.id), ActivityType::Update, "User changed password").await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Start a password reset. Always answers 202 so account existence is not revealed.
///
/// # Errors
/// Returns validation or database errors.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<StatusCode> {
    payload.validate()?;

    let user_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM users WHERE lower(email) = lower($1) AND is_active",
    )
    .bind(&payload.email)
    .fetch_optional(&state.db)
    .await?;

    let Some(user_id) = user_id else {
        debug!("password reset requested for unknown email");
        return Ok(StatusCode::ACCEPTED);
    };

    let token = generate_token();
    let expires_at = Utc::now() + Duration::minutes(state.config.reset_token_ttl_minutes);

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM password_resets WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO password_resets (id, user_id, token, expires_at) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
    log_activity(&mut *tx, Some(user_id), ActivityType::Reset, "Password reset requested").await?;
    tx.commit().await?;

    // No mail transport: operators relay the token out of band.
    info!(%user_id, %expires_at, reset_token = %token, "password reset token issued");
    Ok(StatusCode::ACCEPTED)
}

/// Finish a password reset with a valid, unused, unexpired token.
///
/// # Errors
/// Returns validation errors for unknown, used or expired tokens.
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetConfirm>,
) -> AppResult<StatusCode> {
    payload.validate()?;

    let mut tx = state.db.begin().await?;
    let user_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM password_resets
         WHERE token = $1 AND NOT used AND expires_at > now()
         FOR UPDATE",
    )
    .bind(&payload.token)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Validation("invalid or expired reset token".into()))?;

    let new_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user_id)
        .bind(&new_hash)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE password_resets SET used = TRUE WHERE token = $1")
        .bind(&payload.token)
        .execute(&mut *tx)
        .await?;
    log_activity(&mut *tx, Some(user_id), ActivityType::Reset, "Password reset completed").await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
