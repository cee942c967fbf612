//! Librarian-only reports. Day arithmetic is done on UTC calendar dates to
//! match the fine calculation.

use std::sync::Arc;

use axum::{Extension, Json, extract::State};
use rust_decimal::Decimal;

use crate::{
    AppState,
    errors::AppResult,
    models::{
        ActivityEntry, CurrentUser, FineReportRow, MemberActivityRow, OverdueRow, PopularRow,
        SummaryReport,
    },
};

const UTC_TODAY: &str = "(now() AT TIME ZONE 'UTC')::date";
const UTC_DUE_DAY: &str = "(br.due_date AT TIME ZONE 'UTC')::date";

/// Headline counts for the dashboard.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<SummaryReport>> {
    current.require_librarian()?;

    let (total_titles, total_copies, available_copies) = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT COUNT(*), COALESCE(SUM(total_copies), 0)::bigint, COALESCE(SUM(available_copies), 0)::bigint
         FROM books",
    )
    .fetch_one(&state.db)
    .await?;

    let active_members = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE role = 'Member' AND is_active",
    )
    .fetch_one(&state.db)
    .await?;

    let (active_loans, overdue_loans) = sqlx::query_as::<_, (i64, i64)>(&format!(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE {UTC_DUE_DAY} < {UTC_TODAY})
         FROM borrowings br WHERE br.status = 'Active'"
    ))
    .fetch_one(&state.db)
    .await?;

    let outstanding_fines = sqlx::query_scalar::<_, Option<Decimal>>(
        "SELECT SUM(amount - paid_amount) FROM fines WHERE status IN ('Pending', 'Partially Paid')",
    )
    .fetch_one(&state.db)
    .await?
    .unwrap_or(Decimal::ZERO);

    Ok(Json(SummaryReport {
        total_titles,
        total_copies,
        available_copies,
        active_members,
        active_loans,
        overdue_loans,
        outstanding_fines,
    }))
}

/// Active loans past their due day, most overdue first.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn overdue(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<OverdueRow>>> {
    current.require_librarian()?;

    let rows = sqlx::query_as::<_, OverdueRow>(&format!(
        "SELECT br.id AS borrow_id, b.title, u.full_name, u.email, br.due_date,
                ({UTC_TODAY} - {UTC_DUE_DAY}) AS days_overdue
         FROM borrowings br
         JOIN books b ON b.id = br.book_id
         JOIN users u ON u.id = br.user_id
         WHERE br.status = 'Active' AND {UTC_DUE_DAY} < {UTC_TODAY}
         ORDER BY days_overdue DESC, b.title"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// Twenty most borrowed titles.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<PopularRow>>> {
    current.require_librarian()?;

    let rows = sqlx::query_as::<_, PopularRow>(
        "SELECT b.id AS book_id, b.title, b.author, COUNT(br.id) AS borrow_count
         FROM books b
         LEFT JOIN borrowings br ON br.book_id = b.id
         GROUP BY b.id
         ORDER BY borrow_count DESC, b.title
         LIMIT 20",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// Active members ranked by how much they borrow.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn members(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<MemberActivityRow>>> {
    current.require_librarian()?;

    let rows = sqlx::query_as::<_, MemberActivityRow>(
        "SELECT u.id AS user_id, u.full_name, u.email, u.phone,
                COUNT(br.id) AS total_borrowed, MAX(br.borrow_date) AS last_borrowed
         FROM users u
         LEFT JOIN borrowings br ON br.user_id = u.id
         WHERE u.role = 'Member' AND u.is_active
         GROUP BY u.id
         ORDER BY total_borrowed DESC, u.full_name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// Members who still owe money.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn outstanding_fines(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<FineReportRow>>> {
    current.require_librarian()?;

    let rows = sqlx::query_as::<_, FineReportRow>(
        "SELECT u.id AS user_id, u.full_name, u.email,
                SUM(f.amount - f.paid_amount) AS total_due, COUNT(f.id) AS fine_count
         FROM fines f
         JOIN users u ON u.id = f.user_id
         WHERE f.status IN ('Pending', 'Partially Paid')
         GROUP BY u.id
         HAVING SUM(f.amount - f.paid_amount) > 0
         ORDER BY total_due DESC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// Latest fifty audit entries.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<ActivityEntry>>> {
    current.require_librarian()?;

    let rows = sqlx::query_as::<_, ActivityEntry>(
        "SELECT id, user_id, activity_type, description, created_at
         FROM activity_log
         ORDER BY created_at DESC, id DESC
         LIMIT 50",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}
