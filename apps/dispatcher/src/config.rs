use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::dispatch::render::DEFAULT_RENDER_BASE_URL;
use crate::dispatch::{DispatchSettings, Pacing};

/// Application configuration loaded from environment variables.
/// Every variable has a default; only malformed values are errors.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Used when a request does not name a gateway.
    pub gateway_url: Option<String>,
    pub render_base_url: String,
    pub render_output_dir: Option<PathBuf>,
    pub http_timeout: Duration,
    pub default_pacing: Pacing,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let pool_size = parse_env::<usize>("PRINT_LABEL_POOL", 10)?;
        if pool_size == 0 {
            anyhow::bail!("PRINT_LABEL_POOL must be at least 1");
        }

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            gateway_url: optional_env("GATEWAY_URL"),
            render_base_url: optional_env("RENDER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RENDER_BASE_URL.to_string()),
            render_output_dir: optional_env("RENDER_OUTPUT_DIR").map(PathBuf::from),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
            default_pacing: Pacing::new(pool_size, parse_env("PRINT_LABEL_SLEEP", 1)?),
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            render_base_url: self.render_base_url.clone(),
            render_output_dir: self.render_output_dir.clone(),
            default_pacing: self.default_pacing,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
