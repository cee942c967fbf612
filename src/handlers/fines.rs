use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    activity::{ActivityType, log_activity},
    circulation::outstanding_fines,
    errors::{AppError, AppResult},
    fines::{PaymentError, apply_payment},
    models::{CurrentUser, Fine, FineQuery, FineResponse, MyFinesResponse, PaymentRequest},
};

const FINE_COLUMNS: &str = "id, borrow_id, user_id, amount, paid_amount, status, created_at";

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::AlreadyPaid => AppError::Conflict(e.to_string()),
            PaymentError::NonPositive
            | PaymentError::SubCent
            | PaymentError::Overpayment { .. } => {
                AppError::Validation(e.to_string())
            }
        }
    }
}

/// The caller's fines and the total still owed.
///
/// # Errors
/// Returns database errors.
pub async fn my_fines(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<MyFinesResponse>> {
    let fines = sqlx::query_as::<_, Fine>(&format!(
        "SELECT {FINE_COLUMNS} FROM fines WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(current.id)
    .fetch_all(&state.db)
    .await?;
    let outstanding_total = outstanding_fines(&state.db, current.id).await?;

    Ok(Json(MyFinesResponse {
        fines: fines.into_iter().map(FineResponse::from).collect(),
        outstanding_total,
    }))
}

/// All fines, optionally filtered by status and user.
///
/// # Errors
/// Returns forbidden or database errors.
pub async fn list_fines(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<Vec<FineResponse>>> {
    current.require_librarian()?;

    let fines = sqlx::query_as::<_, Fine>(&format!(
        "SELECT {FINE_COLUMNS} FROM fines
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::uuid IS NULL OR user_id = $2)
         ORDER BY created_at DESC"
    ))
    .bind(query.status)
    .bind(query.user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(fines.into_iter().map(FineResponse::from).collect()))
}

/// Record a full or partial payment against a fine.
///
/// # Errors
/// Returns forbidden, not found, validation, conflict or database errors.
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentRequest>,
) -> AppResult<Json<FineResponse>> {
    current.require_librarian()?;

    let mut tx = state.db.begin().await?;
    let fine = sqlx::query_as::<_, Fine>(&format!(
        "SELECT {FINE_COLUMNS} FROM fines WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    let (paid_amount, status) = apply_payment(fine.amount, fine.paid_amount, fine.status, payload.amount)?;

    let fine = sqlx::query_as::<_, Fine>(&format!(
        "UPDATE fines SET paid_amount = $2, status = $3 WHERE id = $1 RETURNING {FINE_COLUMNS}"
    ))
    .bind(id)
    .bind(paid_amount)
    .bind(status)
    .fetch_one(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Payment,
        &format!("Payment of {} recorded on fine {id}", payload.amount),
    )
    .await?;
    tx.commit().await?;

    info!(fine_id = %id, amount = %payload.amount, "fine payment recorded");
    Ok(Json(fine.into()))
}
