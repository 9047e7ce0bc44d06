use std::path::PathBuf;
use std::time::Duration;

use crate::notify::DEFAULT_DURATION_MS;

pub const DEFAULT_EXECUTION_API_URL: &str = "https://emkc.org/api/v2/piston/execute";

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote code-execution endpoint
    pub execution_api_url: String,
    /// Per-request timeout for the execution API
    pub execution_timeout: Duration,
    /// SQLite database holding snippets, stars, comments and executions
    pub database_url: String,
    /// JSON file backing drafts and editor preferences
    pub local_storage_path: PathBuf,
    /// Base URL the OAuth flow starts from
    pub oauth_base_url: String,
    /// Path the OAuth provider redirects back to
    pub oauth_redirect_path: String,
    pub notification_duration_ms: u64,
    /// Credentials used to sign in before running, if set
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            execution_api_url: env_str("EXECUTION_API_URL", DEFAULT_EXECUTION_API_URL),
            execution_timeout: Duration::from_secs(env_parse("EXECUTION_TIMEOUT_SECS", 30)?),
            database_url: env_str("DATABASE_URL", "sqlite:./data/editor.db"),
            local_storage_path: PathBuf::from(env_str(
                "LOCAL_STORAGE_PATH",
                "./data/local-storage.json",
            )),
            oauth_base_url: env_str("OAUTH_BASE_URL", "http://localhost:3000"),
            oauth_redirect_path: env_str("OAUTH_REDIRECT_PATH", "/auth/callback"),
            notification_duration_ms: env_parse("NOTIFICATION_DURATION_MS", DEFAULT_DURATION_MS)?,
            email: std::env::var("EDITOR_EMAIL").ok().filter(|v| !v.is_empty()),
            password: std::env::var("EDITOR_PASSWORD").ok().filter(|v| !v.is_empty()),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
