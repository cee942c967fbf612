use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    activity::{ActivityType, log_activity},
    errors::{AppError, AppResult},
    models::{Book, BookQuery, BookRequest, BookResponse, CurrentUser},
};

const BOOK_COLUMNS: &str = "id, title, author, isbn, category, publisher, publication_year, \
     description, total_copies, available_copies, created_at";

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// List books, optionally filtered by a search term, category and availability.
///
/// # Errors
/// Returns database errors.
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);
    let category = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let books = sqlx::query_as::<_, Book>(&format!(
        "SELECT {BOOK_COLUMNS} FROM books
         WHERE ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
           AND ($2::text IS NULL OR lower(category) = lower($2))
           AND (NOT $3 OR available_copies > 0)
         ORDER BY title"
    ))
    .bind(search)
    .bind(category)
    .bind(query.available_only.unwrap_or(false))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// Get a single book by id.
///
/// # Errors
/// Returns not found or database errors.
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookResponse>> {
    let book = sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(book.into()))
}

/// Distinct categories in the catalog.
///
/// # Errors
/// Returns database errors.
pub async fn list_categories(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<String>>> {
    let categories = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category FROM books WHERE category IS NOT NULL ORDER BY category",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(categories))
}

/// Add a book; every copy starts out available.
///
/// # Errors
/// Returns forbidden, validation, conflict (duplicate ISBN) or database errors.
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<BookRequest>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    current.require_librarian()?;
    payload.validate()?;

    let mut tx = state.db.begin().await?;
    let book = sqlx::query_as::<_, Book>(&format!(
        "INSERT INTO books (id, title, author, isbn, category, publisher, publication_year,
                            description, total_copies, available_copies)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
         RETURNING {BOOK_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&payload.title)
    .bind(&payload.author)
    .bind(&payload.isbn)
    .bind(&payload.category)
    .bind(&payload.publisher)
    .bind(payload.publication_year)
    .bind(&payload.description)
    .bind(payload.total_copies)
    .fetch_one(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Insert,
        &format!("Added new book: {}", book.title),
    )
    .await?;
    tx.commit().await?;

    info!(book_id = %book.id, "book added");
    Ok((StatusCode::CREATED, Json(book.into())))
}

/// Copies available after changing the total from `old_total` to `new_total`,
/// or `None` when fewer copies would remain than are currently on loan.
#[must_use]
pub fn rebalance_available(old_total: i32, old_available: i32, new_total: i32) -> Option<i32> {
    let on_loan = old_total - old_available;
    (new_total >= on_loan).then_some(new_total - on_loan)
}

/// Update a book. Changing the copy count shifts availability by the same delta.
///
/// # Errors
/// Returns forbidden, validation, not found, conflict or database errors.
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BookRequest>,
) -> AppResult<Json<BookResponse>> {
    current.require_librarian()?;
    payload.validate()?;

    let mut tx = state.db.begin().await?;
    let existing = sqlx::query_as::<_, Book>(&format!(
        "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    let available = rebalance_available(
        existing.total_copies,
        existing.available_copies,
        payload.total_copies,
    )
    .ok_or_else(|| {
        AppError::Conflict(format!(
            "{} copies are on loan; total cannot drop to {}",
            existing.total_copies - existing.available_copies,
            payload.total_copies
        ))
    })?;

    let book = sqlx::query_as::<_, Book>(&format!(
        "UPDATE books SET title = $2, author = $3, isbn = $4, category = $5, publisher = $6,
                          publication_year = $7, description = $8, total_copies = $9,
                          available_copies = $10
         WHERE id = $1
         RETURNING {BOOK_COLUMNS}"
    ))
    .bind(id)
    .bind(&payload.title)
    .bind(&payload.author)
    .bind(&payload.isbn)
    .bind(&payload.category)
    .bind(&payload.publisher)
    .bind(payload.publication_year)
    .bind(&payload.description)
    .bind(payload.total_copies)
    .bind(available)
    .fetch_one(&mut *tx)
    .await?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Update,
        &format!("Updated book: {}", book.title),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(book.into()))
}

/// Delete a book that has no active loans.
///
/// # Errors
/// Returns forbidden, not found, conflict or database errors.
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current.require_librarian()?;

    let mut tx = state.db.begin().await?;
    let title = sqlx::query_scalar::<_, String>("SELECT title FROM books WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrowings WHERE book_id = $1 AND status = 'Active'",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if active > 0 {
        return Err(AppError::Conflict(format!(
            "book is currently borrowed ({active} active loans)"
        )));
    }

    // Loan history references the book, so only never-borrowed titles can go.
    sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    log_activity(
        &mut *tx,
        Some(current.id),
        ActivityType::Delete,
        &format!("Deleted book: {title}"),
    )
    .await?;
    tx.commit().await?;

    info!(book_id = %id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}
