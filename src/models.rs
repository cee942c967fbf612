use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum Role {
    Member,
    Librarian,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "Member",
            Role::Librarian => "Librarian",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum BorrowStatus {
    Active,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum FineStatus {
    Pending,
    #[serde(rename = "Partially Paid")]
    #[sqlx(rename = "Partially Paid")]
    PartiallyPaid,
    Paid,
}

impl FineStatus {
    #[must_use]
    pub fn is_outstanding(self) -> bool {
        matches!(self, FineStatus::Pending | FineStatus::PartiallyPaid)
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Borrowing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Fine {
    pub id: Uuid,
    pub borrow_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
}

/// Borrowing joined with its book, borrower and (optional) fine.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LoanRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub title: String,
    pub author: String,
    pub username: String,
    pub full_name: String,
    pub fine_amount: Option<Decimal>,
    pub fine_status: Option<FineStatus>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub activity_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
    pub refresh: bool,
}

/// Authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub fn is_librarian(&self) -> bool {
        self.role == Role::Librarian
    }

    /// # Errors
    /// Returns `Forbidden` unless the caller is a Librarian.
    pub fn require_librarian(&self) -> crate::AppResult<()> {
        if self.is_librarian() {
            Ok(())
        } else {
            Err(crate::AppError::Forbidden("librarian role required".into()))
        }
    }

    /// Guard a change to account `target` that would leave it with `role` and
    /// `is_active`. The acting Librarian may not demote or deactivate themselves.
    ///
    /// # Errors
    /// Returns `Conflict` for a self-demotion or self-deactivation.
    pub fn check_account_change(&self, target: Uuid, role: Role, is_active: bool) -> crate::AppResult<()> {
        if target != self.id {
            return Ok(());
        }
        if role != self.role {
            return Err(crate::AppError::Conflict("cannot change your own role".into()));
        }
        if !is_active {
            return Err(crate::AppError::Conflict("cannot deactivate your own account".into()));
        }
        Ok(())
    }
}

/// Usernames are 3-20 characters of ASCII letters, digits and underscores.
///
/// # Errors
/// Returns a validation error naming the offending rule.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len_ok = (3..=20).contains(&username.len());
    let chars_ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

// ───── auth ─────

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(length(equal = 64))]
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

// ───── users ─────

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            full_name: u.full_name,
            phone: u.phone,
            role: u.role,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct TemporaryPasswordResponse {
    pub user_id: Uuid,
    pub temporary_password: String,
}

// ───── books ─────

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub available_only: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 255))]
    pub author: String,
    #[validate(length(min = 10, max = 17))]
    pub isbn: String,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 1000, max = 9999))]
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub total_copies: i32,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<Book> for BookResponse {
    fn from(b: Book) -> Self {
        Self {
            id: b.id,
            title: b.title,
            author: b.author,
            isbn: b.isbn,
            category: b.category,
            publisher: b.publisher,
            publication_year: b.publication_year,
            description: b.description,
            total_copies: b.total_copies,
            available_copies: b.available_copies,
        }
    }
}

// ───── circulation ─────

#[derive(Debug, Deserialize, Validate)]
pub struct BorrowRequest {
    #[validate(length(min = 1, max = 20))]
    pub book_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequest {
    #[validate(length(min = 1, max = 20))]
    pub borrow_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoanQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LoanResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub username: String,
    pub full_name: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub overdue: bool,
    pub days_overdue: i64,
    /// Fine accrued so far on an active loan, or the assessed fine once returned.
    pub fine_amount: Option<Decimal>,
    pub fine_status: Option<FineStatus>,
}

#[derive(Debug, Serialize)]
pub struct BorrowResponse {
    pub borrowed: Vec<Borrowing>,
    pub unavailable: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReturnedLoan {
    pub borrow_id: Uuid,
    pub book_id: Uuid,
    pub return_date: DateTime<Utc>,
    pub days_late: i64,
    pub fine: Option<FineResponse>,
}

#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub returned: Vec<ReturnedLoan>,
    pub not_returned: Vec<Uuid>,
}

// ───── fines ─────

#[derive(Debug, Serialize)]
pub struct FineResponse {
    pub id: Uuid,
    pub borrow_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining: Decimal,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Fine> for FineResponse {
    fn from(f: Fine) -> Self {
        Self {
            id: f.id,
            borrow_id: f.borrow_id,
            user_id: f.user_id,
            amount: f.amount,
            paid_amount: f.paid_amount,
            remaining: f.amount - f.paid_amount,
            status: f.status,
            created_at: f.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MyFinesResponse {
    pub fines: Vec<FineResponse>,
    pub outstanding_total: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct FineQuery {
    pub status: Option<FineStatus>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

// ───── settings ─────

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LibrarySettings {
    pub fine_per_day: Decimal,
    pub max_books_per_user: i64,
    pub loan_period_days: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub fine_per_day: Option<Decimal>,
    #[validate(range(min = 1, max = 100))]
    pub max_books_per_user: Option<i64>,
    #[validate(range(min = 1, max = 365))]
    pub loan_period_days: Option<i64>,
}

// ───── reports ─────

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub total_titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub active_members: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub outstanding_fines: Decimal,
}

#[derive(sqlx::FromRow, Debug, Serialize)]
pub struct OverdueRow {
    pub borrow_id: Uuid,
    pub title: String,
    pub full_name: String,
    pub email: String,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i32,
}

#[derive(sqlx::FromRow, Debug, Serialize)]
pub struct PopularRow {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub borrow_count: i64,
}

#[derive(sqlx::FromRow, Debug, Serialize)]
pub struct MemberActivityRow {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub total_borrowed: i64,
    pub last_borrowed: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Debug, Serialize)]
pub struct FineReportRow {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub total_due: Decimal,
    pub fine_count: i64,
}
