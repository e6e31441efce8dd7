//! Server configuration read from environment variables.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chronoweave_generator::HttpGeneratorConfig;
use chronoweave_simulation::application::engine::{EngineSettings, RetryPolicy};

use crate::error::AppError;

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Narrative generator connection.
    pub generator: HttpGeneratorConfig,
    /// Engine tunables.
    pub engine: EngineSettings,
    /// Progress channel capacity per run.
    pub stream_buffer: usize,
    /// Finalized runs kept in memory.
    pub run_history_limit: usize,
    /// OTLP/gRPC collector; span export is off when absent.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or any
    /// variable fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let generator_url = get("NARRATIVE_GENERATOR_URL").ok_or_else(|| {
            AppError::Config("NARRATIVE_GENERATOR_URL environment variable must be set".to_owned())
        })?;

        let engine = EngineSettings {
            health_check_every_years: positive(&get, "HEALTH_CHECK_EVERY_YEARS", 1)?,
            pause_poll_interval: Duration::from_millis(positive(&get, "PAUSE_POLL_INTERVAL_MS", 250)?),
            retry: RetryPolicy {
                max_attempts: positive(&get, "GENERATOR_MAX_ATTEMPTS", 3)?,
                base_backoff: Duration::from_millis(parsed(&get, "GENERATOR_BACKOFF_MS", 500)?),
                ..RetryPolicy::default()
            },
            ..EngineSettings::default()
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parsed(&get, "PORT", 3000)?,
            generator: HttpGeneratorConfig {
                endpoint: generator_url,
                api_key: get("NARRATIVE_GENERATOR_API_KEY"),
                timeout: Duration::from_secs(positive(&get, "GENERATOR_TIMEOUT_SECS", 120)?),
            },
            engine,
            stream_buffer: positive(&get, "STREAM_BUFFER", 64)?,
            run_history_limit: positive(&get, "RUN_HISTORY_LIMIT", 50)?,
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// The address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}

fn positive<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
{
    let value = parsed(get, key, default)?;
    if value > T::default() {
        Ok(value)
    } else {
        Err(AppError::Config(format!("{key} must be greater than zero")))
    }
}
