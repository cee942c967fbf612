use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    AppState, circulation,
    errors::AppResult,
    fines,
    models::{
        BorrowRequest, BorrowResponse, BorrowStatus, CurrentUser, HistoryQuery, LibrarySettings,
        LoanQuery, LoanRecord, LoanResponse, ReturnRequest, ReturnResponse,
    },
};

const LOAN_SELECT: &str = "
    SELECT br.id, br.user_id, br.book_id, br.borrow_date, br.due_date, br.return_date, br.status,
           b.title, b.author, u.username, u.full_name,
           f.amount AS fine_amount, f.status AS fine_status
    FROM borrowings br
    JOIN books b ON b.id = br.book_id
    JOIN users u ON u.id = br.user_id
    LEFT JOIN fines f ON f.borrow_id = br.id";

/// Attach overdue state and, for active loans, the fine accrued so far.
#[must_use]
pub fn loan_response(record: LoanRecord, now: DateTime<Utc>, fine_per_day: Decimal) -> LoanResponse {
    let active = record.status == BorrowStatus::Active;
    let days_overdue = if active {
        fines::days_late(record.due_date, now)
    } else {
        0
    };
    let fine_amount = if active {
        Some(fines::accrued_fine(record.due_date, now, fine_per_day)).filter(|f| *f > Decimal::ZERO)
    } else {
        record.fine_amount
    };

    LoanResponse {
        id: record.id,
        user_id: record.user_id,
        book_id: record.book_id,
        title: record.title,
        author: record.author,
        username: record.username,
        full_name: record.full_name,
        borrow_date: record.borrow_date,
        due_date: record.due_date,
        return_date: record.return_date,
        status: record.status,
        overdue: days_overdue > 0,
        days_overdue,
        fine_amount,
        fine_status: record.fine_status,
    }
}

/// Borrow one or more books for the caller.
///
/// # Errors
/// Returns validation, forbidden, conflict or database errors.
pub async fn borrow_books(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowResponse>)> {
    payload.validate()?;

    let settings = LibrarySettings::load(&state.db).await?;
    let outcome = circulation::borrow_books(&state.db, current.id, &payload.book_ids, &settings).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Return one or more loans.
///
/// # Errors
/// Returns validation, conflict or database errors.
pub async fn return_books(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<ReturnRequest>,
) -> AppResult<Json<ReturnResponse>> {
    payload.validate()?;

    let settings = LibrarySettings::load(&state.db).await?;
    let outcome = circulation::return_books(&state.db, current, &payload.borrow_ids, &settings).await?;
    Ok(Json(outcome))
}

/// The caller's loans, soonest due first.
///
/// # Errors
/// Returns database errors.
pub async fn my_loans(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanResponse>>> {
    let records = sqlx::query_as::<_, LoanRecord>(&format!(
        "{LOAN_SELECT}
         WHERE br.user_id = $1 AND (NOT $2 OR br.status = 'Active')
         ORDER BY br.status, br.due_date"
    ))
    .bind(current.id)
    .bind(query.active_only.unwrap_or(false))
    .fetch_all(&state.db)
    .await?;

    let settings = LibrarySettings::load(&state.db).await?;
    let now = Utc::now();
    Ok(Json(
        records
            .into_iter()
            .map(|r| loan_response(r, now, settings.fine_per_day))
            .collect(),
    ))
}

/// Borrowing history, most recent first. Members see their own; Librarians see
/// everyone's or one user's via `user_id`.
///
/// # Errors
/// Returns database errors.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<LoanResponse>>> {
    let user_filter = if current.is_librarian() {
        query.user_id
    } else {
        Some(current.id)
    };

    let records = sqlx::query_as::<_, LoanRecord>(&format!(
        "{LOAN_SELECT}
         WHERE ($1::uuid IS NULL OR br.user_id = $1)
         ORDER BY br.borrow_date DESC
         LIMIT 100"
    ))
    .bind(user_filter)
    .fetch_all(&state.db)
    .await?;

    let settings = LibrarySettings::load(&state.db).await?;
    let now = Utc::now();
    Ok(Json(
        records
            .into_iter()
            .map(|r| loan_response(r, now, settings.fine_per_day))
            .collect(),
    ))
}
