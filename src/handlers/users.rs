use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::auth::USER_COLUMNS;
use crate::{
    AppState,
    activity::{ActivityType, log_activity},
    circulation::active_loan_count,
    errors::{AppError, AppResult},
    models::{
        CreateUserRequest, CurrentUser, SetActiveRequest, TemporaryPasswordResponse,
        UpdateUserRequest, User, UserListQuery, UserResponse,
    },
    utils::{generate_temporary_password, hash_password},
};

/// List users, optionally restricted to one role.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    current.require_librarian()?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE ($1::text IS NULL OR role = $1)
         ORDER BY role, full_name"
    ))
    .bind(query.role.map(|r| r.as_str()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// # Errors
/// Returns forbidden, not found or database errors.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    current.require_librarian()?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

/// Create a Member or Librarian account.
///
/// # Errors
/// Returns forbidden, validation, conflict or database errors.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    current.require_librarian()?;
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
    .bind(payload.role)
    .fetch_one(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Insert,
        &format!("Created {} account: {}", user.role.as_str(), user.username),
    )
    .await?;
    tx.commit().await?;

    info!(user_id = %user.id, role = user.role.as_str(), "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Update a user's contact details and role. A Librarian cannot demote themselves.
///
/// # Errors
/// Returns forbidden, validation, not found, conflict or database errors.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    current.require_librarian()?;
    payload.validate()?;
    current.check_account_change(id, payload.role, true)?;

    let mut tx = state.db.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET email = $2, full_name = $3, phone = $4, role = $5
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(&payload.email)
    .bind(&payload.full_name)
    .bind(&payload.phone)
    .bind(payload.role)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Update,
        &format!("Updated user: {}", user.username),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(user.into()))
}

/// Activate or deactivate an account. Accounts holding books stay active.
///
/// # Errors
/// Returns forbidden, not found, conflict or database errors.
pub async fn set_active(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> AppResult<Json<UserResponse>> {
    current.require_librarian()?;
    current.check_account_change(id, current.role, payload.is_active)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    if !payload.is_active {
        let active = active_loan_count(&mut *tx, id).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "user has {active} active borrowings"
            )));
        }
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.is_active)
    .fetch_one(&mut *tx)
    .await?;

    let action = if payload.is_active { "activated" } else { "deactivated" };
    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Update,
        &format!("User account {action}: {}", user.username),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(user.into()))
}

/// Replace a user's password with a generated one, returned once to the Librarian.
///
/// # Errors
/// Returns forbidden, not found or database errors.
pub async fn reset_user_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TemporaryPasswordResponse>> {
    current.require_librarian()?;

    let temporary_password = generate_temporary_password();
    let hash = hash_password(&temporary_password)?;

    let mut tx = state.db.begin().await?;
    let username = sqlx::query_scalar::<_, String>(
        "UPDATE users SET password_hash = $2 WHERE id = $1 RETURNING username",
    )
    .bind(id)
    .bind(&hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Reset,
        &format!("Password reset for user: {username}"),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(TemporaryPasswordResponse {
        user_id: id,
        temporary_password,
    }))
}
