//! Configuration types for zonectl.
//!
//! Every component receives its own section explicitly; nothing reads
//! process-wide state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, ZoneCtlError};
use crate::scheduler::filters::KNOWN_FILTERS;

/// Prefix for environment overrides, e.g. `ZONECTL__COORDINATION__BACKEND_URL`.
pub const ENV_PREFIX: &str = "ZONECTL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordination backend and group settings.
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Partition space settings.
    #[serde(default)]
    pub partitioning: PartitionConfig,

    /// Pool scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load from an optional TOML file plus `ZONECTL__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scheduler.filters")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.partitioning.partition_count == 0 {
            return Err(ZoneCtlError::Config("partition_count must be positive".into()));
        }
        let c = &self.coordination;
        if c.heartbeat_interval_secs == 0 || c.run_watchers_interval_secs == 0 {
            return Err(ZoneCtlError::Config("coordination intervals must be positive".into()));
        }
        if c.member_fetch_attempts == 0 {
            return Err(ZoneCtlError::Config("member_fetch_attempts must be positive".into()));
        }
        if c.group_id.is_empty() {
            return Err(ZoneCtlError::Config("group_id must not be empty".into()));
        }
        if self.scheduler.filters.is_empty() {
            return Err(ZoneCtlError::NoFiltersConfigured);
        }
        if let Some(name) = self
            .scheduler
            .filters
            .iter()
            .find(|name| !KNOWN_FILTERS.contains(&name.as_str()))
        {
            return Err(ZoneCtlError::UnknownFilter { name: name.clone() });
        }
        Ok(())
    }
}

/// Coordination backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Backend address; empty runs every component in standalone mode.
    #[serde(default)]
    pub backend_url: String,

    /// Group all workers of this service join.
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Liveness report interval.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Interval between polls for membership and election events.
    #[serde(default = "default_run_watchers_interval")]
    pub run_watchers_interval_secs: u64,

    /// Fixed delay between connection attempts.
    #[serde(default = "default_connect_retry")]
    pub connect_retry_secs: u64,

    /// Attempts for a member-list fetch before giving up.
    #[serde(default = "default_member_fetch_attempts")]
    pub member_fetch_attempts: u32,

    /// Upper bound of the random delay between member-list fetch attempts.
    #[serde(default = "default_member_fetch_max_jitter")]
    pub member_fetch_max_jitter_ms: u64,
}

impl CoordinationConfig {
    /// Standalone configuration (no backend).
    pub fn standalone() -> Self {
        Self::default()
    }

    /// Configuration pointing at `backend_url`.
    pub fn with_backend(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn run_watchers_interval(&self) -> Duration {
        Duration::from_secs(self.run_watchers_interval_secs)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }

    pub fn member_fetch_max_jitter(&self) -> Duration {
        Duration::from_millis(self.member_fetch_max_jitter_ms)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            group_id: default_group_id(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            run_watchers_interval_secs: default_run_watchers_interval(),
            connect_retry_secs: default_connect_retry(),
            member_fetch_attempts: default_member_fetch_attempts(),
            member_fetch_max_jitter_ms: default_member_fetch_max_jitter(),
        }
    }
}

/// Partition space configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Size of the partition space `0..partition_count`.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,
}

impl PartitionConfig {
    /// The full ordered partition space.
    pub fn partitions(&self) -> Vec<u32> {
        (0..self.partition_count).collect()
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partition_count: default_partition_count(),
        }
    }
}

/// Pool scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pool used by the default, fallback and in-doubt filters.
    #[serde(default = "default_pool_id")]
    pub default_pool_id: Uuid,

    /// Ordered filter chain, by filter name.
    #[serde(default = "default_filters")]
    pub filters: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_pool_id: default_pool_id(),
            filters: default_filters(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "zonectl_core=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_group_id() -> String {
    "zonectl".to_string()
}

fn default_heartbeat_interval() -> u64 {
    crate::DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_run_watchers_interval() -> u64 {
    crate::DEFAULT_RUN_WATCHERS_INTERVAL_SECS
}

fn default_connect_retry() -> u64 {
    crate::DEFAULT_CONNECT_RETRY_SECS
}

fn default_member_fetch_attempts() -> u32 {
    5
}

fn default_member_fetch_max_jitter() -> u64 {
    2000
}

fn default_partition_count() -> u32 {
    crate::DEFAULT_PARTITION_COUNT
}

fn default_pool_id() -> Uuid {
    Uuid::from_u128(crate::DEFAULT_POOL_ID)
}

fn default_filters() -> Vec<String> {
    vec!["pool_id_attribute".to_string(), "fallback".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}
