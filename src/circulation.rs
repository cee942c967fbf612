//! Borrow and return workflows.
//!
//! Both run as one transaction per request. The borrower's user row is locked
//! while the loan limit is checked, each book row is locked while its available
//! count changes, so concurrent requests cannot over-borrow or lose updates.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    activity::{ActivityType, log_activity},
    errors::{AppError, AppResult},
    fines,
    models::{
        Book, BorrowResponse, BorrowStatus, Borrowing, CurrentUser, Fine, FineResponse,
        LibrarySettings, ReturnResponse, ReturnedLoan,
    },
};

/// # Errors
/// Returns database errors.
pub async fn active_loan_count<'e, E: PgExecutor<'e>>(executor: E, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND status = 'Active'",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

/// Sum of unpaid balances over Pending and Partially Paid fines.
///
/// # Errors
/// Returns database errors.
pub async fn outstanding_fines<'e, E: PgExecutor<'e>>(executor: E, user_id: Uuid) -> AppResult<Decimal> {
    let total = sqlx::query_scalar::<_, Option<Decimal>>(
        "SELECT SUM(amount - paid_amount) FROM fines
         WHERE user_id = $1 AND status IN ('Pending', 'Partially Paid')",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}

/// Sort and dedupe so batches always lock rows in the same order.
fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Account-level checks made before any book is considered.
///
/// # Errors
/// `Forbidden` for an inactive account or any unpaid fine, `Validation` when
/// `requested` more loans would exceed `max_books`.
pub fn check_borrower(
    is_active: bool,
    owed: Decimal,
    active_loans: i64,
    requested: usize,
    max_books: i64,
) -> AppResult<()> {
    if !is_active {
        return Err(AppError::Forbidden("account is inactive".into()));
    }
    if owed > Decimal::ZERO {
        return Err(AppError::Forbidden(format!(
            "outstanding fines of {owed} must be paid before borrowing"
        )));
    }
    let requested = i64::try_from(requested).unwrap_or(i64::MAX);
    if active_loans.saturating_add(requested) > max_books {
        return Err(AppError::Validation(format!(
            "borrowing limit of {max_books} books reached ({active_loans} currently borrowed)"
        )));
    }
    Ok(())
}

/// A copy can be lent when one is free and the borrower does not already hold this book.
#[must_use]
pub fn can_lend(available_copies: i32, already_holding: bool) -> bool {
    available_copies > 0 && !already_holding
}

/// Members return their own active loans; Librarians return any active loan.
#[must_use]
pub fn can_return(loan: &Borrowing, actor: CurrentUser) -> bool {
    loan.status == BorrowStatus::Active && (loan.user_id == actor.id || actor.is_librarian())
}

/// Borrow every listed book that has a free copy.
///
/// # Errors
/// `Forbidden` for inactive accounts or unpaid fines, `Validation` when the
/// request exceeds the loan limit, `Conflict` when nothing could be borrowed.
pub async fn borrow_books(
    pool: &PgPool,
    user_id: Uuid,
    book_ids: &[Uuid],
    settings: &LibrarySettings,
) -> AppResult<BorrowResponse> {
    let book_ids = lock_order(book_ids);
    let mut tx = pool.begin().await?;

    let is_active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
    let owed = outstanding_fines(&mut *tx, user_id).await?;
    let current = active_loan_count(&mut *tx, user_id).await?;
    check_borrower(is_active, owed, current, book_ids.len(), settings.max_books_per_user)?;

    let now = Utc::now();
    let due = now + Duration::days(settings.loan_period_days);
    let mut borrowed = Vec::new();
    let mut unavailable = Vec::new();

    for book_id in book_ids {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(book) = book else {
            unavailable.push(book_id);
            continue;
        };

        let already_holding = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM borrowings WHERE user_id = $1 AND book_id = $2 AND status = 'Active')",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if !can_lend(book.available_copies, already_holding) {
            debug!(%book_id, already_holding, "book skipped");
            unavailable.push(book_id);
            continue;
        }

        let borrowing = sqlx::query_as::<_, Borrowing>(
            "INSERT INTO borrowings (id, user_id, book_id, borrow_date, due_date, status)
             VALUES ($1, $2, $3, $4, $5, 'Active')
             RETURNING id, user_id, book_id, borrow_date, due_date, return_date, status",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(book_id)
        .bind(now)
        .bind(due)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET available_copies = available_copies - 1 WHERE id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        log_activity(
            &mut *tx,
            Some(user_id),
            ActivityType::Borrow,
            &format!("Borrowed \"{}\" (loan {})", book.title, borrowing.id),
        )
        .await?;

        borrowed.push(borrowing);
    }

    if borrowed.is_empty() {
        return Err(AppError::Conflict(
            "no books were borrowed; they may be unavailable or already on loan to you".into(),
        ));
    }

    tx.commit().await?;
    info!(%user_id, count = borrowed.len(), "books borrowed");

    Ok(BorrowResponse {
        borrowed,
        unavailable,
    })
}

/// Return the listed loans. Members may only return their own; Librarians any.
/// Late returns create a Pending fine.
///
/// # Errors
/// `Conflict` when none of the listed loans could be returned.
pub async fn return_books(
    pool: &PgPool,
    actor: CurrentUser,
    borrow_ids: &[Uuid],
    settings: &LibrarySettings,
) -> AppResult<ReturnResponse> {
    let borrow_ids = lock_order(borrow_ids);
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let mut returned = Vec::new();
    let mut not_returned = Vec::new();

    for borrow_id in borrow_ids {
        let loan = sqlx::query_as::<_, Borrowing>(
            "SELECT id, user_id, book_id, borrow_date, due_date, return_date, status
             FROM borrowings WHERE id = $1 FOR UPDATE",
        )
        .bind(borrow_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(loan) = loan.filter(|l| can_return(l, actor)) else {
            not_returned.push(borrow_id);
            continue;
        };

        sqlx::query("UPDATE borrowings SET status = 'Returned', return_date = $2 WHERE id = $1")
            .bind(loan.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE books SET available_copies = available_copies + 1 WHERE id = $1")
            .bind(loan.book_id)
            .execute(&mut *tx)
            .await?;

        let days_late = fines::days_late(loan.due_date, now);
        let amount = fines::calculate_fine(loan.due_date, now, settings.fine_per_day);
        let fine = if amount > Decimal::ZERO {
            let fine = sqlx::query_as::<_, Fine>(
                "INSERT INTO fines (id, borrow_id, user_id, amount, paid_amount, status)
                 VALUES ($1, $2, $3, $4, 0, 'Pending')
                 RETURNING id, borrow_id, user_id, amount, paid_amount, status, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(loan.id)
            .bind(loan.user_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await?;
            Some(FineResponse::from(fine))
        } else {
            None
        };

        let description = match &fine {
            Some(f) => format!("Returned loan {} {days_late} day(s) late, fine {}", loan.id, f.amount),
            None => format!("Returned loan {}", loan.id),
        };
        log_activity(&mut *tx, Some(actor.id), ActivityType::Return, &description).await?;

        returned.push(ReturnedLoan {
            borrow_id: loan.id,
            book_id: loan.book_id,
            return_date: now,
            days_late,
            fine,
        });
    }

    if returned.is_empty() {
        return Err(AppError::Conflict("no books were returned".into()));
    }

    tx.commit().await?;
    info!(actor = %actor.id, count = returned.len(), "books returned");

    Ok(ReturnResponse {
        returned,
        not_returned,
    })
}
