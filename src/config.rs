use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_port: u16,
    pub db_max_connections: u32,
    pub rate_limit_per_minute: u32,
    pub reset_token_ttl_minutes: i64,
    pub bootstrap_librarian: Option<BootstrapLibrarian>,
}

/// Credentials for the first Librarian account, created at startup when none exists.
#[derive(Clone, Debug, Deserialize)]
pub struct BootstrapLibrarian {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables, applying defaults where appropriate.
    ///
    /// # Errors
    /// Returns an error if mandatory variables (`DATABASE_URL`, `JWT_SECRET`) are missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let server_port = env_or("SERVER_PORT", 8080);
        let db_max_connections = env_or("DB_MAX_CONNECTIONS", 5);
        let rate_limit_per_minute = env_or("RATE_LIMIT_PER_MINUTE", 60).max(1);
        let reset_token_ttl_minutes = env_or("RESET_TOKEN_TTL_MINUTES", 60);

        let bootstrap_librarian = match (
            std::env::var("BOOTSTRAP_LIBRARIAN_USERNAME"),
            std::env::var("BOOTSTRAP_LIBRARIAN_EMAIL"),
            std::env::var("BOOTSTRAP_LIBRARIAN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(BootstrapLibrarian {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            server_port,
            db_max_connections,
            rate_limit_per_minute,
            reset_token_ttl_minutes,
            bootstrap_librarian,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
