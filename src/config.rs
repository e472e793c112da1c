//! Configuration management for the link prober

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::classifier::StatusPolicy;
use crate::deadline::DeadlineSettings;
use crate::retry::RetryPolicy;

/// Desktop browser User-Agent sent with every content fetch.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Timeout used before any latency has been observed
    pub base_timeout: Duration,

    /// Lower bound for the adaptive timeout
    pub min_timeout: Duration,

    /// Upper bound for the adaptive timeout
    pub max_timeout: Duration,

    /// Factor applied to the trimmed mean latency
    pub timeout_multiplier: f64,

    /// Number of latency samples kept for the adaptive timeout
    pub latency_window: usize,

    /// Probe invocations per URL, including the first one
    pub max_retries: u32,

    /// Linear backoff step between probe invocations
    pub retry_backoff_ms: u64,

    /// Redirect hops the content fetch follows
    pub max_redirects: usize,

    /// User-Agent header for the content fetch
    pub user_agent: String,

    /// Probes allowed in flight during a scan
    pub scan_concurrency: usize,

    /// 4xx codes that still count as a live destination
    pub lenient_status_codes: Vec<u16>,

    /// 5xx codes treated as a transient outage
    pub transient_status_codes: Vec<u16>,
}

impl Default for Config {
    fn default() -> Self {
        let policy = StatusPolicy::default();
        Self {
            base_timeout: Duration::from_millis(6000),
            min_timeout: Duration::from_millis(4000),
            max_timeout: Duration::from_millis(12000),
            timeout_multiplier: 2.5,
            latency_window: 10,
            max_retries: 2,
            retry_backoff_ms: 2000,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            scan_concurrency: 5,
            lenient_status_codes: policy.lenient.into_iter().collect(),
            transient_status_codes: policy.transient.into_iter().collect(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(ms) = env_parse::<u64>("PROBE_BASE_TIMEOUT_MS") {
            config.base_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("PROBE_MIN_TIMEOUT_MS") {
            config.min_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("PROBE_MAX_TIMEOUT_MS") {
            config.max_timeout = Duration::from_millis(ms);
        }

        if let Some(multiplier) = env_parse::<f64>("PROBE_TIMEOUT_MULTIPLIER") {
            config.timeout_multiplier = multiplier;
        }

        if let Some(window) = env_parse("PROBE_LATENCY_WINDOW") {
            config.latency_window = window;
        }

        if let Some(retries) = env_parse("PROBE_MAX_RETRIES") {
            config.max_retries = retries;
        }

        if let Some(backoff) = env_parse("PROBE_RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = backoff;
        }

        if let Some(redirects) = env_parse("PROBE_MAX_REDIRECTS") {
            config.max_redirects = redirects;
        }

        if let Ok(user_agent) = env::var("PROBE_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Some(concurrency) = env_parse("SCAN_CONCURRENCY") {
            config.scan_concurrency = concurrency;
        }

        if let Ok(codes) = env::var("PROBE_LENIENT_STATUS_CODES") {
            config.lenient_status_codes = parse_status_codes(&codes);
        }

        if let Ok(codes) = env::var("PROBE_TRANSIENT_STATUS_CODES") {
            config.transient_status_codes = parse_status_codes(&codes);
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_timeout > self.max_timeout {
            return Err("min_timeout cannot exceed max_timeout".to_string());
        }

        if self.base_timeout < self.min_timeout || self.base_timeout > self.max_timeout {
            return Err("base_timeout must lie between min_timeout and max_timeout".to_string());
        }

        if !self.timeout_multiplier.is_finite() || self.timeout_multiplier <= 0.0 {
            return Err("timeout_multiplier must be a positive number".to_string());
        }

        if self.latency_window == 0 {
            return Err("latency_window must be greater than 0".to_string());
        }

        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        if self.scan_concurrency == 0 {
            return Err("scan_concurrency must be greater than 0".to_string());
        }

        if self.user_agent.trim().is_empty() {
            return Err("user_agent cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn deadline_settings(&self) -> DeadlineSettings {
        DeadlineSettings {
            base_timeout: self.base_timeout,
            min_timeout: self.min_timeout,
            max_timeout: self.max_timeout,
            multiplier: self.timeout_multiplier,
            window: self.latency_window,
        }
    }

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::new(
            self.lenient_status_codes.iter().copied(),
            self.transient_status_codes.iter().copied(),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_step: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

/// Parse a comma separated list of status codes, skipping anything that isn't one.
pub fn parse_status_codes(raw: &str) -> Vec<u16> {
    raw.split(',')
        .filter_map(|code| code.trim().parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
        .collect()
}
