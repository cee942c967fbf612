//! Append-only audit trail.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Login,
    Register,
    Insert,
    Update,
    Delete,
    Borrow,
    Return,
    Payment,
    Reset,
}

impl ActivityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Login => "LOGIN",
            ActivityType::Register => "REGISTER",
            ActivityType::Insert => "INSERT",
            ActivityType::Update => "UPDATE",
            ActivityType::Delete => "DELETE",
            ActivityType::Borrow => "BORROW",
            ActivityType::Return => "RETURN",
            ActivityType::Payment => "PAYMENT",
            ActivityType::Reset => "RESET",
        }
    }
}

/// Append an activity row. Pass the open transaction when recording a mutation
/// so the entry commits or rolls back with it.
///
/// # Errors
/// Returns database errors.
pub async fn log_activity<'e, E>(
    executor: E,
    user_id: Option<Uuid>,
    kind: ActivityType,
    description: &str,
) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("INSERT INTO activity_log (user_id, activity_type, description) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(kind.as_str())
        .bind(description)
        .execute(executor)
        .await?;
    Ok(())
}
