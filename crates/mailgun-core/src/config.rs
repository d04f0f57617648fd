//! Configuration types for the Mailgun provider
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::model::ResourceKind;
use crate::poll::PollPolicy;

/// Main provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Mailgun private API key
    pub api_key: String,

    /// Override for the region endpoint (tests, proxies)
    ///
    /// When set, every region is served from this base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Per-request HTTP timeout (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Delete confirmation polling
    #[serde(default)]
    pub poll: PollConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<REDACTED>")
            .field("api_base_url", &self.api_base_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("poll", &self.poll)
            .field("engine", &self.engine)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a configuration with defaults for everything but the key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: None,
            http_timeout_secs: default_http_timeout_secs(),
            poll: PollConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Serve every region from `url`
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Set the overall deadline for a single operation
    pub fn with_operation_timeout(mut self, secs: u64) -> Self {
        self.engine.operation_timeout_secs = Some(secs);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_key.trim().is_empty() {
            return Err(crate::Error::config("Mailgun API key cannot be empty"));
        }

        if let Some(url) = &self.api_base_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "API base URL must be http(s), got '{}'",
                url
            )));
        }

        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }

        self.poll.validate()?;
        self.engine.validate()?;

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Delete confirmation polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before the second existence check (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound for the delay between checks (in milliseconds)
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Factor applied to the delay after every check
    ///
    /// 1.0 polls at a fixed interval.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// How long to wait for a deleted domain to disappear (in seconds)
    #[serde(default = "default_domain_timeout_secs")]
    pub domain_timeout_secs: u64,

    /// How long to wait for routes, credentials and webhooks (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl PollConfig {
    /// Validate the polling configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_ms == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.max_interval_ms < self.interval_ms {
            return Err(crate::Error::config(
                "Poll max interval must not be below the poll interval",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(crate::Error::config("Poll backoff multiplier must be >= 1.0"));
        }
        if self.domain_timeout_secs == 0 || self.default_timeout_secs == 0 {
            return Err(crate::Error::config("Poll timeouts must be > 0"));
        }
        Ok(())
    }

    /// Polling policy used after deleting an entity of `kind`
    pub fn policy_for(&self, kind: ResourceKind) -> PollPolicy {
        let timeout_secs = match kind {
            ResourceKind::Domain => self.domain_timeout_secs,
            ResourceKind::Route | ResourceKind::Credential | ResourceKind::Webhook => {
                self.default_timeout_secs
            }
        };

        PollPolicy {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_millis(self.interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            domain_timeout_secs: default_domain_timeout_secs(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Overall deadline for one operation on one entity (in seconds)
    ///
    /// Caps the delete confirmation poll when shorter than its own timeout.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(crate::Error::config("Operation timeout must be > 0"));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            operation_timeout_secs: None,
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_domain_timeout_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}
