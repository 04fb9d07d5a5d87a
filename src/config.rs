// Jaskier Shared Pattern — config
// Typed view over the environment-variable surface. Loaded once at startup;
// an invalid or missing required value is fatal before any queue or service
// is constructed.

use std::time::Duration;

use crate::error::AppError;

fn env_ci(key: &str) -> Option<String> {
    // The contract is case-insensitive even though POSIX env vars are not:
    // scan once rather than guess at casing conventions callers might use.
    std::env::vars()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_ci(key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, AppError> {
    match env_ci(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigInvalid(format!("{key} must be an integer, got '{v}'"))),
        None => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub microservice_name: String,
    pub dev_mode: bool,

    pub polling_interval: Duration,
    pub max_concurrent_jobs: u32,
    pub shutdown_timeout: Duration,
    pub job_timeout: Duration,

    pub oracle_dsn: Option<String>,
    pub oracle_user: Option<String>,
    pub oracle_password: Option<String>,
    pub oracle_table: String,

    pub log_console_json: bool,
    pub debug: bool,

    pub otel_logs_endpoint: Option<String>,
    pub otel_traces_endpoint: Option<String>,
    pub otel_user: Option<String>,
    pub otel_password: Option<String>,

    pub http_host: String,
    pub http_port: u16,

    pub mongodb_uri: Option<String>,
    pub mongodb_database: Option<String>,
    pub mongodb_heartbeat_interval: Duration,
    pub mongodb_key_ttl: Duration,
    pub service_version: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let microservice_name = env_ci("MICROSERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::ConfigInvalid("MICROSERVICE_NAME is required".into()))?;

        let dev_mode = env_bool("DEV_MODE", false);

        let oracle_user = env_ci("ORACLE_USER");
        let oracle_password = env_ci("ORACLE_PASSWORD");
        if !dev_mode && (oracle_user.is_none() || oracle_password.is_none()) {
            return Err(AppError::ConfigInvalid(
                "ORACLE_USER and ORACLE_PASSWORD are required unless DEV_MODE=true".into(),
            ));
        }

        Ok(Self {
            microservice_name,
            dev_mode,
            polling_interval: Duration::from_secs(env_u64("POLLING_INTERVAL_SECONDS", 5)?),
            max_concurrent_jobs: env_u64("MAX_CONCURRENT_JOBS", 10)? as u32,
            shutdown_timeout: Duration::from_secs(env_u64("SHUTDOWN_TIMEOUT_SECONDS", 60)?),
            job_timeout: Duration::from_secs(env_u64("JOB_TIMEOUT_SECONDS", 300)?),

            oracle_dsn: env_ci("ORACLE_DSN"),
            oracle_user,
            oracle_password,
            oracle_table: env_ci("ORACLE_TABLE").unwrap_or_else(|| "MICRO_SVC".to_string()),

            log_console_json: env_bool("LOG_CONSOLE_JSON", false),
            debug: env_bool("DEBUG", false),

            otel_logs_endpoint: env_ci("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT"),
            otel_traces_endpoint: env_ci("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT"),
            otel_user: env_ci("OTEL_EXPORTER_OTLP_USER"),
            otel_password: env_ci("OTEL_EXPORTER_OTLP_PASSWORD"),

            http_host: env_ci("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: env_ci("HTTP_PORT")
                .map(|v| v.parse().map_err(|_| AppError::ConfigInvalid("HTTP_PORT must be an integer".into())))
                .transpose()?
                .unwrap_or(8000),

            mongodb_uri: env_ci("MONGODB_URI").filter(|v| !v.is_empty()),
            mongodb_database: env_ci("MONGODB_DATABASE"),
            mongodb_heartbeat_interval: Duration::from_secs(env_u64("MONGODB_HEARTBEAT_SECONDS", 30)?),
            mongodb_key_ttl: Duration::from_secs(env_u64("MONGODB_KEY_TTL_SECONDS", 90)?),
            service_version: env_ci("SERVICE_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        })
    }

    /// Builds a minimal valid config for tests, bypassing environment lookup.
    pub fn for_test() -> Self {
        Self {
            microservice_name: "test-service".to_string(),
            dev_mode: true,
            polling_interval: Duration::from_millis(50),
            max_concurrent_jobs: 10,
            shutdown_timeout: Duration::from_secs(5),
            job_timeout: Duration::from_secs(5),
            oracle_dsn: None,
            oracle_user: None,
            oracle_password: None,
            oracle_table: "MICRO_SVC".to_string(),
            log_console_json: false,
            debug: true,
            otel_logs_endpoint: None,
            otel_traces_endpoint: None,
            otel_user: None,
            otel_password: None,
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            mongodb_uri: None,
            mongodb_database: None,
            mongodb_heartbeat_interval: Duration::from_secs(30),
            mongodb_key_ttl: Duration::from_secs(90),
            service_version: "test".to_string(),
        }
    }
}
