use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub profile: String,
    /// Whether a student may resubmit a quest after a rejection.
    pub allow_resubmit_rejected: bool,
    /// Bounded retry for transient store failures at the ledger boundary.
    pub ledger_retry_attempts: u32,
    pub ledger_retry_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let profile = env::var("PROFILE").unwrap_or_else(|_| "default".to_string());

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            if profile == "default" {
                "sqlite://questledger.db?mode=rwc".to_string()
            } else {
                format!("sqlite://questledger_{}.db?mode=rwc", profile)
            }
        });

        Self {
            database_url,
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(Vec::new),
            profile,
            allow_resubmit_rejected: env::var("ALLOW_RESUBMIT_REJECTED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            ledger_retry_attempts: env::var("LEDGER_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            ledger_retry_backoff_ms: env::var("LEDGER_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }
}
