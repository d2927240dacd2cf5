// src/config.rs
//! Environment-driven settings for the preview service.

use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PREVIEW_MAX_BUFFER_BYTES: usize = 256 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Largest buffer a single preview socket may accumulate.
    pub preview_max_buffer_bytes: usize,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Reads `BIND_ADDR`, `PREVIEW_MAX_BUFFER_BYTES` and `LOG_FORMAT`.
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let preview_max_buffer_bytes = match lookup("PREVIEW_MAX_BUFFER_BYTES") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "PREVIEW_MAX_BUFFER_BYTES",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_PREVIEW_MAX_BUFFER_BYTES,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr,
            preview_max_buffer_bytes,
            log_format,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            preview_max_buffer_bytes: DEFAULT_PREVIEW_MAX_BUFFER_BYTES,
            log_format: LogFormat::Pretty,
        }
    }
}
