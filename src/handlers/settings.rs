use std::sync::Arc;

use axum::{Extension, Json, extract::State};
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    AppState,
    activity::{ActivityType, log_activity},
    errors::{AppError, AppResult},
    models::{CurrentUser, LibrarySettings, UpdateSettingsRequest},
    settings::{FINE_PER_DAY, LOAN_PERIOD_DAYS, MAX_BOOKS_PER_USER, store},
};

/// Current circulation policy.
///
/// # Errors
/// Returns database errors.
pub async fn get_settings(State(state): State<Arc<AppState>>) -> AppResult<Json<LibrarySettings>> {
    Ok(Json(LibrarySettings::load(&state.db).await?))
}

/// Change one or more policy values.
///
/// # Errors
/// Returns forbidden, validation or database errors.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> AppResult<Json<LibrarySettings>> {
    current.require_librarian()?;
    payload.validate()?;
    if payload.fine_per_day.is_some_and(|f| f < Decimal::ZERO) {
        return Err(AppError::Validation("fine_per_day must not be negative".into()));
    }

    let mut changes = Vec::new();
    if let Some(fine) = payload.fine_per_day {
        changes.push((FINE_PER_DAY, fine.round_dp(2).to_string()));
    }
    if let Some(max) = payload.max_books_per_user {
        changes.push((MAX_BOOKS_PER_USER, max.to_string()));
    }
    if let Some(days) = payload.loan_period_days {
        changes.push((LOAN_PERIOD_DAYS, days.to_string()));
    }

    let mut tx = state.db.begin().await?;
    for (key, value) in &changes {
        store(&mut *tx, key, value).await?;
        log_activity(
            &mut *tx,
            Some(current.id),
            ActivityType::Update,
            &format!("System setting {key} set to {value}"),
        )
        .await?;
    }
    let settings = LibrarySettings::load(&mut *tx).await?;
    tx.commit().await?;

    Ok(Json(settings))
}
