//! Library policy stored in `system_settings`.

use rust_decimal::Decimal;
use sqlx::PgExecutor;
use tracing::warn;

use crate::{errors::AppResult, models::LibrarySettings};

pub const FINE_PER_DAY: &str = "fine_per_day";
pub const MAX_BOOKS_PER_USER: &str = "max_books_per_user";
pub const LOAN_PERIOD_DAYS: &str = "loan_period_days";

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            fine_per_day: Decimal::new(50, 2),
            max_books_per_user: 5,
            loan_period_days: 14,
        }
    }
}

impl LibrarySettings {
    /// Build settings from key/value rows. Unknown keys are ignored and
    /// unparsable values fall back to the default for that key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            let parsed = match key {
                FINE_PER_DAY => value.parse().map(|v| settings.fine_per_day = v).is_ok(),
                MAX_BOOKS_PER_USER => value.parse().map(|v| settings.max_books_per_user = v).is_ok(),
                LOAN_PERIOD_DAYS => value.parse().map(|v| settings.loan_period_days = v).is_ok(),
                _ => true,
            };
            if !parsed {
                warn!(key, value, "ignoring unparsable system setting");
            }
        }
        settings
    }

    /// # Errors
    /// Returns database errors.
    pub async fn load<'e, E: PgExecutor<'e>>(executor: E) -> AppResult<Self> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM system_settings")
            .fetch_all(executor)
            .await?;
        Ok(Self::from_pairs(rows))
    }
}

/// # Errors
/// Returns database errors.
pub async fn store<'e, E: PgExecutor<'e>>(executor: E, key: &str, value: &str) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO system_settings (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}
