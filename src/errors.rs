use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is inactive")]
    AccountInactive,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("database error")]
    Database(sqlx::Error),
    #[error("internal error")]
    Anyhow(#[from] anyhow::Error),
}

/// Classify driver errors so constraint failures reach the client as something actionable.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("{} already exists", unique_subject(db_err.constraint())))
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                let what = db_err.constraint().unwrap_or("check").to_string();
                AppError::Validation(format!("constraint {what} violated"))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::Conflict("record is still referenced".into())
            }
            _ => AppError::Database(err),
        }
    }
}

/// Field named by a unique index, for conflict messages.
#[must_use]
pub fn unique_subject(constraint: Option<&str>) -> &str {
    match constraint {
        Some("users_username_lower_key") => "username",
        Some("users_email_lower_key") => "email",
        Some("books_isbn_key") => "isbn",
        Some(other) => other,
        None => "record",
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::AccountInactive | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side detail only; the client gets the generic Display text.
        match &self {
            AppError::Database(e) => tracing::error!(error = %e, "database error"),
            AppError::Anyhow(e) => tracing::error!(error = ?e, "internal error"),
            _ => {}
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
