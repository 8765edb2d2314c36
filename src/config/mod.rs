// SPDX-License-Identifier: MIT
//! Sync layer configuration (`SyncConfig`).
//!
//! Every tunable behavioral constant lives here: the debounce quiet period,
//! the minimum input length for suggestions, the alert queue bound, request
//! timeouts, and retry depths. Values can be loaded from a TOML file;
//! missing sections and fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_API_BASE_URL: &str = "https://api.taskmind.io";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DEBOUNCE_MS: u64 = 400;
const DEFAULT_MIN_SUGGEST_LEN: usize = 3;
const DEFAULT_MAX_ALERTS: usize = 5;
const DEFAULT_ALERT_TTL_SECS: u64 = 5;
const DEFAULT_AUTOCOMPLETE_TTL_SECS: u64 = 30;
const DEFAULT_MUTATION_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

// ─── SuggestConfig ────────────────────────────────────────────────────────────

/// Suggestion pipeline tuning (`[suggest]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Quiet period before a suggestion request fires (milliseconds).
    pub debounce_ms: u64,
    /// Inputs shorter than this never trigger a request; suggestion state is
    /// cleared immediately instead. The original call sites disagreed between
    /// 3 and 5 characters — this is the single knob that settles it.
    pub min_input_len: usize,
    /// Client-side lifetime of cached autocomplete results (seconds).
    pub autocomplete_ttl_secs: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            min_input_len: DEFAULT_MIN_SUGGEST_LEN,
            autocomplete_ttl_secs: DEFAULT_AUTOCOMPLETE_TTL_SECS,
        }
    }
}

// ─── AlertConfig ─────────────────────────────────────────────────────────────

/// Notification queue tuning (`[alerts]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Hard bound on queue length. Pushing past it evicts the oldest
    /// non-pinned entry.
    pub max_alerts: usize,
    /// Default time-to-live for ephemeral alerts (seconds). Zero means
    /// pinned until explicitly dismissed.
    pub default_ttl_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_alerts: DEFAULT_MAX_ALERTS,
            default_ttl_secs: DEFAULT_ALERT_TTL_SECS,
        }
    }
}

// ─── RetrySection ────────────────────────────────────────────────────────────

/// Transport retry tuning (`[retry]` in config.toml).
///
/// Transport errors get a fixed-delay bounded retry. Mutations carry their
/// own attempt count so a failed save is retried a little harder than a lost
/// suggestion request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySection {
    /// Attempts for fetch/suggestion calls (including the first try).
    pub fetch_attempts: u32,
    /// Attempts for task mutations (including the first try).
    pub mutation_attempts: u32,
    /// Fixed delay between attempts (milliseconds).
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            fetch_attempts: 2,
            mutation_attempts: DEFAULT_MUTATION_RETRY_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

// ─── SyncConfig ──────────────────────────────────────────────────────────────

/// Top-level configuration for the sync layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the task store / AI collaborator.
    pub api_base_url: String,
    /// Upper bound on every outbound request (seconds). A timeout is treated
    /// identically to any other transport failure.
    pub request_timeout_secs: u64,
    pub suggest: SuggestConfig,
    pub alerts: AlertConfig,
    pub retry: RetrySection,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            suggest: SuggestConfig::default(),
            alerts: AlertConfig::default(),
            retry: RetrySection::default(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document. Missing keys default.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load from a TOML file, falling back to defaults if the file is
    /// missing or malformed (a bad config file must never brick the client).
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match Self::from_toml_str(&raw) {
                Ok(cfg) => {
                    info!(path = %path.display(), "loaded sync config");
                    cfg
                }
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "malformed config — using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.suggest.debounce_ms)
    }

    pub fn autocomplete_ttl(&self) -> Duration {
        Duration::from_secs(self.suggest.autocomplete_ttl_secs)
    }

    pub fn default_alert_ttl(&self) -> Duration {
        Duration::from_secs(self.alerts.default_ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.delay_ms)
    }
}
