pub mod auth;
pub mod books;
pub mod fines;
pub mod loans;
pub mod reports;
pub mod settings;
pub mod users;

/// Health check endpoint.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn health_check() -> &'static str {
    "OK"
}
