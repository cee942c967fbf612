//! Borrow and return flows against a migrated database (requires `DATABASE_URL`).

use chrono::{Duration, Utc};
use library_api::{
    AppError, CurrentUser, FineStatus, LibrarySettings, Role,
    circulation::{borrow_books, return_books},
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

async fn create_user(pool: &PgPool, username: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, username, email, full_name, password_hash, role)
         VALUES ($1, $2, $3, $2, 'x', $4)",
    )
    .bind(id)
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(role)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn create_book(pool: &PgPool, isbn: &str, copies: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO books (id, title, author, isbn, total_copies, available_copies)
         VALUES ($1, $2, 'Author', $2, $3, $3)",
    )
    .bind(id)
    .bind(isbn)
    .bind(copies)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn available(pool: &PgPool, book_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT available_copies FROM books WHERE id = $1")
        .bind(book_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn member(id: Uuid) -> CurrentUser {
    CurrentUser { id, role: Role::Member }
}

#[sqlx::test(migrations = "./migrations")]
async fn borrow_skips_unavailable_and_already_held_books(pool: PgPool) {
    let settings = LibrarySettings::default();
    let user = create_user(&pool, "reader", Role::Member).await;
    let book = create_book(&pool, "9780000000001", 2).await;
    let empty = create_book(&pool, "9780000000002", 0).await;

    let outcome = borrow_books(&pool, user, &[book, empty], &settings).await.unwrap();
    assert_eq!(outcome.borrowed.len(), 1);
    assert_eq!(outcome.unavailable, vec![empty]);
    assert_eq!(available(&pool, book).await, 1);

    let again = borrow_books(&pool, user, &[book], &settings).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(available(&pool, book).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn borrow_limit_and_account_state_are_enforced(pool: PgPool) {
    let settings = LibrarySettings {
        max_books_per_user: 1,
        ..LibrarySettings::default()
    };
    let user = create_user(&pool, "reader", Role::Member).await;
    let a = create_book(&pool, "9780000000001", 1).await;
    let b = create_book(&pool, "9780000000002", 1).await;

    let over = borrow_books(&pool, user, &[a, b], &settings).await;
    assert!(matches!(over, Err(AppError::Validation(_))));
    assert_eq!(available(&pool, a).await, 1);

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();
    let inactive = borrow_books(&pool, user, &[a], &settings).await;
    assert!(matches!(inactive, Err(AppError::Forbidden(_))));
}

#[sqlx::test(migrations = "./migrations")]
async fn late_return_creates_pending_fine_and_blocks_borrowing(pool: PgPool) {
    let settings = LibrarySettings::default();
    let user = create_user(&pool, "reader", Role::Member).await;
    let book = create_book(&pool, "9780000000001", 1).await;
    let other = create_book(&pool, "9780000000002", 1).await;

    let outcome = borrow_books(&pool, user, &[book], &settings).await.unwrap();
    let loan_id = outcome.borrowed[0].id;
    sqlx::query("UPDATE borrowings SET due_date = $2 WHERE id = $1")
        .bind(loan_id)
        .bind(Utc::now() - Duration::days(3))
        .execute(&pool)
        .await
        .unwrap();

    let returned = return_books(&pool, member(user), &[loan_id], &settings).await.unwrap();
    let fine = returned.returned[0].fine.as_ref().unwrap();
    assert_eq!(returned.returned[0].days_late, 3);
    assert_eq!(fine.amount, settings.fine_per_day * Decimal::from(3));
    assert_eq!(fine.status, FineStatus::Pending);
    assert_eq!(available(&pool, book).await, 1);

    let blocked = borrow_books(&pool, user, &[other], &settings).await;
    assert!(matches!(blocked, Err(AppError::Forbidden(_))));
}

#[sqlx::test(migrations = "./migrations")]
async fn members_cannot_return_other_members_loans(pool: PgPool) {
    let settings = LibrarySettings::default();
    let owner = create_user(&pool, "owner", Role::Member).await;
    let stranger = create_user(&pool, "stranger", Role::Member).await;
    let librarian = create_user(&pool, "librarian", Role::Librarian).await;
    let book = create_book(&pool, "9780000000001", 1).await;

    let loan_id = borrow_books(&pool, owner, &[book], &settings).await.unwrap().borrowed[0].id;

    let denied = return_books(&pool, member(stranger), &[loan_id], &settings).await;
    assert!(matches!(denied, Err(AppError::Conflict(_))));
    assert_eq!(available(&pool, book).await, 0);

    let actor = CurrentUser { id: librarian, role: Role::Librarian };
    let outcome = return_books(&pool, actor, &[loan_id, Uuid::new_v4()], &settings)
        .await
        .unwrap();
    assert_eq!(outcome.returned.len(), 1);
    assert_eq!(outcome.not_returned.len(), 1);
    assert!(outcome.returned[0].fine.is_none());
    assert_eq!(available(&pool, book).await, 1);
}
