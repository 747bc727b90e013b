//! TOML config file loading, environment overrides, and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config file structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the control authority (no trailing path).
    pub backend_url: String,
    pub poll_interval_sec: u64,
    pub request_timeout_sec: u64,
    pub web_port: u16,
    /// Rows requested from `/data` for the history feed.
    pub history_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "https://agricultural-backend.onrender.com".to_string(),
            poll_interval_sec: 5,
            request_timeout_sec: 8,
            web_port: 8080,
            history_limit: 100,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    /// Validate all fields. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let url = self.backend_url.trim();
        if url.is_empty() {
            errors.push("backend_url is empty".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "backend_url '{url}' must start with http:// or https://"
            ));
        }

        if self.poll_interval_sec == 0 {
            errors.push("poll_interval_sec must be positive, got 0".to_string());
        }
        if self.request_timeout_sec == 0 {
            errors.push("request_timeout_sec must be positive, got 0".to_string());
        }
        if self.history_limit == 0 {
            errors.push("history_limit must be positive, got 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BACKEND_URL") {
            self.backend_url = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SEC") {
            self.poll_interval_sec = parse_env("POLL_INTERVAL_SEC", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SEC") {
            self.request_timeout_sec = parse_env("REQUEST_TIMEOUT_SEC", &v)?;
        }
        if let Some(v) = lookup("WEB_PORT") {
            self.web_port = parse_env("WEB_PORT", &v)?;
        }
        if let Some(v) = lookup("HISTORY_LIMIT") {
            self.history_limit = parse_env("HISTORY_LIMIT", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {name}: '{value}'"))
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read the TOML file at `path` (a missing file means defaults), overlay the
/// process environment, and validate.
pub fn load(path: &str) -> Result<Config> {
    load_with(path, |k| std::env::var(k).ok())
}

/// [`load`] with an explicit environment lookup.
fn load_with<F>(path: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file, using defaults");
            Config::default()
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read config: {path}")),
    };

    config.apply_env(lookup)?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        backend = %config.backend_url,
        poll_interval_sec = config.poll_interval_sec,
        request_timeout_sec = config.request_timeout_sec,
        "config loaded"
    );

    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
