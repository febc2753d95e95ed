use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Browser origins allowed to call the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub auth_clock_skew: Duration,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub max_batch_size: usize,
    pub max_body_bytes: usize,
    pub allowed_origins: AllowedOrigins,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field("max_batch_size", &self.max_batch_size)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "OUTPOST_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "OUTPOST_DATABASE_PATH", "outpost.db");

        let jwt_secret = required_trimmed(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }

        let auth_clock_skew_secs = bounded(&lookup, "AUTH_CLOCK_SKEW_SECS", "60", 0, 300)?;
        let rate_limit_window_secs =
            bounded(&lookup, "RATE_LIMIT_WINDOW_SECS", "900", 10, 3_600)?;
        let sync_rate_limit_per_window =
            bounded(&lookup, "SYNC_RATE_LIMIT_PER_WINDOW", "100", 1, 10_000)?;
        let max_batch_size = bounded(&lookup, "SYNC_MAX_BATCH_SIZE", "500", 1, 5_000)?;
        let max_body_bytes = bounded(
            &lookup,
            "MAX_BODY_BYTES",
            "52428800",
            1_024,
            256 * 1024 * 1024,
        )?;

        let allowed_origins = parse_origins(optional_trimmed(&lookup, "ALLOWED_ORIGINS"))?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window: u32::try_from(sync_rate_limit_per_window)
                .map_err(|_| ConfigError::Invalid("SYNC_RATE_LIMIT_PER_WINDOW".to_string()))?,
            max_batch_size: usize::try_from(max_batch_size)
                .map_err(|_| ConfigError::Invalid("SYNC_MAX_BATCH_SIZE".to_string()))?,
            max_body_bytes: usize::try_from(max_body_bytes)
                .map_err(|_| ConfigError::Invalid("MAX_BODY_BYTES".to_string()))?,
            allowed_origins,
        })
    }
}

fn bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]")))?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn parse_origins(raw: Option<String>) -> Result<AllowedOrigins, ConfigError> {
    let Some(raw) = raw else {
        return Ok(AllowedOrigins::Any);
    };
    if raw == "*" {
        return Ok(AllowedOrigins::Any);
    }

    let origins: Vec<String> = raw
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect();
    if let Some(bad) = origins.iter().find(|origin| !is_http_url(origin)) {
        return Err(ConfigError::Invalid(format!(
            "ALLOWED_ORIGINS entry `{bad}` must start with http:// or https://"
        )));
    }
    if origins.is_empty() {
        return Ok(AllowedOrigins::Any);
    }
    Ok(AllowedOrigins::List(origins))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
