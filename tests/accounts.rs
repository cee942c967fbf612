//! Account constraints against a migrated database (requires `DATABASE_URL`).

use library_api::AppError;
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_user(pool: &PgPool, username: &str, email: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO users (id, username, email, full_name, password_hash)
         VALUES ($1, $2, $3, $2, 'x')",
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn usernames_differing_only_in_case_conflict(pool: PgPool) {
    insert_user(&pool, "alice", "alice@example.com").await.unwrap();

    let err = insert_user(&pool, "Alice", "other@example.com").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref msg) if msg == "username already exists"));
}

#[sqlx::test(migrations = "./migrations")]
async fn emails_differing_only_in_case_conflict(pool: PgPool) {
    insert_user(&pool, "alice", "alice@example.com").await.unwrap();

    let err = insert_user(&pool, "bob", "ALICE@example.com").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref msg) if msg == "email already exists"));
}
