//! read dispatcher configuration from a file or the environment

use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;
use crate::retry::{JitterStrategy, RetryPlan};

pub const DEFAULT_LEAD_TIME_SECS: u64 = 5 * 60;
pub const DEFAULT_PARAMS_ENCODING: &str = "UTF-8";

pub enum ConfigLocation {
    File(String),
    Env,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    /// How long before expiry a submission starts a refresh cycle.
    pub lead_time_secs: u64,
    pub params_encoding: String,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub initial_delay_ms: u64,
    pub multiplier: f32,
    pub max_delay_ms: u64,
    pub jitter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: String::from("bearer-dispatch"),
            app_version: String::from(env!("CARGO_PKG_VERSION")),
            lead_time_secs: DEFAULT_LEAD_TIME_SECS,
            params_encoding: String::from(DEFAULT_PARAMS_ENCODING),
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            multiplier: 1.8,
            max_delay_ms: 5_000,
            jitter: String::from("full"),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `DISPATCH_*` variables resolved through `lookup`.
    /// Missing variables keep their defaults.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(name) = lookup("DISPATCH_APP_NAME") {
            config.app_name = name;
        }
        if let Some(version) = lookup("DISPATCH_APP_VERSION") {
            config.app_version = version;
        }
        if let Some(raw) = lookup("DISPATCH_LEAD_TIME_SECS") {
            config.lead_time_secs = parse_var("DISPATCH_LEAD_TIME_SECS", &raw)?;
        }
        if let Some(encoding) = lookup("DISPATCH_PARAMS_ENCODING") {
            config.params_encoding = encoding;
        }
        if let Some(raw) = lookup("DISPATCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("DISPATCH_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DISPATCH_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_var("DISPATCH_RETRY_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(jitter) = lookup("DISPATCH_RETRY_JITTER") {
            config.retry.jitter = jitter;
        }
        Ok(config)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `<app>/<version> (<os>; <arch>)`
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}; {})",
            self.app_name,
            self.app_version,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    pub fn retry_plan(&self) -> Result<RetryPlan, Error> {
        let jitter: JitterStrategy = self.retry.jitter.parse()?;
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be >= 1".into()));
        }
        Ok(RetryPlan::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            self.retry.multiplier,
            Duration::from_millis(self.retry.max_delay_ms),
            jitter,
        ))
    }
}

pub fn read_config(loc: ConfigLocation) -> Result<Config, Error> {
    match loc {
        ConfigLocation::File(path) => Config::from_file(&path),
        ConfigLocation::Env => Config::from_env(),
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("Malformed {name} env var: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.lead_time(), Duration::from_secs(300));
        assert_eq!(config.params_encoding, "UTF-8");
        assert!(config.user_agent().starts_with("bearer-dispatch/"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"app_name":"acme","retry":{"max_attempts":5}}"#).unwrap();
        assert_eq!(config.app_name, "acme");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 200);
        assert_eq!(config.lead_time_secs, DEFAULT_LEAD_TIME_SECS);
    }

    #[test]
    fn env_lookup_overrides_and_rejects_garbage() {
        let vars: HashMap<&str, &str> = [
            ("DISPATCH_APP_NAME", "mobile"),
            ("DISPATCH_LEAD_TIME_SECS", "60"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.app_name, "mobile");
        assert_eq!(config.lead_time(), Duration::from_secs(60));

        let err = Config::from_lookup(|k| {
            (k == "DISPATCH_LEAD_TIME_SECS").then(|| "soon".to_string())
        })
        .expect_err("non-numeric lead time");
        assert!(matches!(err, Error::Config(msg) if msg.contains("DISPATCH_LEAD_TIME_SECS")));
    }

    #[test]
    fn retry_plan_rejects_unknown_jitter() {
        let mut config = Config::default();
        config.retry.jitter = "wobbly".into();
        assert!(matches!(config.retry_plan(), Err(Error::Config(_))));
    }
}
