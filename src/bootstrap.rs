//! First-run Librarian account. Self-registration only ever creates Members.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::{
    activity::{ActivityType, log_activity},
    config::BootstrapLibrarian,
    errors::{AppError, AppResult},
    models::{Role, validate_username},
    utils::hash_password,
};

/// Create the configured Librarian unless one already exists.
///
/// Returns `true` when an account was created.
///
/// # Errors
/// Returns validation errors for unusable credentials, or database errors.
pub async fn ensure_librarian(db: &PgPool, account: &BootstrapLibrarian) -> AppResult<bool> {
    validate_username(&account.username)
        .map_err(|_| AppError::Validation("bootstrap username is invalid".into()))?;
    if !account.email.validate_email() {
        return Err(AppError::Validation("bootstrap email is invalid".into()));
    }
    if account.password.len() < 8 {
        return Err(AppError::Validation("bootstrap password is too short".into()));
    }

    let mut tx = db.begin().await?;
    // Serialise concurrent replicas starting at once.
    sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'Librarian')",
    )
    .fetch_one(&mut *tx)
    .await?;
    if exists {
        return Ok(false);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, username, email, full_name, password_hash, role)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(&account.username)
    .bind(&account.email)
    .bind(&account.username)
    .bind(hash_password(&account.password)?)
    .bind(Role::Librarian)
    .execute(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(id),
        ActivityType::Insert,
        &format!("Bootstrap librarian created: {}", account.username),
    )
    .await?;
    tx.commit().await?;

    info!(user_id = %id, "bootstrap librarian created");
    Ok(true)
}
