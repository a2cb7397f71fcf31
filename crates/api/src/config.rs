use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

/// Read an env var, falling back to `default` when unset.
///
/// Panics on an unparseable value -- misconfiguration should fail fast
/// at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e:?}")),
        Err(_) => default,
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
        }
    }
}

/// Telemetry pipeline tunables loaded from environment variables.
///
/// | Env Var                    | Default                  |
/// |----------------------------|--------------------------|
/// | `FLUSH_PERIOD_SECS`        | `1800` (30 minutes)      |
/// | `CLASSIFIER_URL`           | `http://localhost:8500`  |
/// | `CLASSIFIER_TIMEOUT_SECS`  | `10`                     |
/// | `ESCALATION_THRESHOLD`     | `5`                      |
/// | `ESCALATION_WINDOW_SECS`   | `900` (15 minutes)       |
/// | `RATE_LIMIT_QUOTA`         | `5`                      |
/// | `RATE_LIMIT_WINDOW_SECS`   | `1800` (30 minutes)      |
/// | `VITALS_QUERY_WINDOW_SECS` | `1800` (30 minutes)      |
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub flush_period: Duration,
    pub classifier_url: String,
    pub classifier_timeout: Duration,
    pub escalation_threshold: i64,
    pub escalation_window: Duration,
    pub rate_limit_quota: i64,
    pub rate_limit_window: Duration,
    /// Trailing window for the recent-vitals query.
    pub vitals_query_window: chrono::Duration,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            flush_period: Duration::from_secs(env_or("FLUSH_PERIOD_SECS", 1800)),
            classifier_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8500".into()),
            classifier_timeout: Duration::from_secs(env_or("CLASSIFIER_TIMEOUT_SECS", 10)),
            escalation_threshold: env_or("ESCALATION_THRESHOLD", 5),
            escalation_window: Duration::from_secs(env_or("ESCALATION_WINDOW_SECS", 900)),
            rate_limit_quota: env_or("RATE_LIMIT_QUOTA", 5),
            rate_limit_window: Duration::from_secs(env_or("RATE_LIMIT_WINDOW_SECS", 1800)),
            vitals_query_window: chrono::Duration::seconds(env_or(
                "VITALS_QUERY_WINDOW_SECS",
                1800,
            )),
        }
    }
}

/// Combined application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }
}
