//! zonectl core - control plane for a DNS-as-a-service orchestrator
//!
//! This crate provides:
//! - Coordination client, partition ownership and leader election
//! - Per-zone distributed locking
//! - Pool scheduling through a configurable filter chain

pub mod config;
pub mod coordination;
pub mod error;
pub mod locking;
pub mod metrics;
pub mod objects;
pub mod policy;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use coordination::{CoordinationClient, LeaderElection, MemberId, Partitioner};
pub use error::{Result, ZoneCtlError};
pub use locking::{ResourceId, ZoneLock};
pub use objects::{Pool, RequestContext, Zone};
pub use runtime::Service;
pub use scheduler::Scheduler;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 1;

/// Default interval between watcher polls in seconds
pub const DEFAULT_RUN_WATCHERS_INTERVAL_SECS: u64 = 10;

/// Default delay between connection attempts in seconds
pub const DEFAULT_CONNECT_RETRY_SECS: u64 = 15;

/// Default partition space size, one partition per zone shard
pub const DEFAULT_PARTITION_COUNT: u32 = 4096;

/// Default pool id (`794ccc2c-d751-44fe-b57f-8894c9f5c842`)
pub const DEFAULT_POOL_ID: u128 = 0x794ccc2c_d751_44fe_b57f_8894c9f5c842;
