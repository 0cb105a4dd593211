//! Cluster coordination
//!
//! Client lifecycle over a Coordination Service backend, partition
//! ownership and leader election built on its group primitives.

pub mod assignment;
pub mod backend;
pub mod client;
pub mod dispatch;
pub mod leader;
pub mod member;
pub mod memory;
pub mod partitioner;
pub mod retry;

pub use assignment::PartitionAssigner;
pub use backend::{CoordinationBackend, CoordinationEvent, DistributedLock, EventKind};
pub use client::CoordinationClient;
pub use dispatch::{Dispatcher, EventHandler, WatchId};
pub use leader::{LeaderCallback, LeaderElection};
pub use member::MemberId;
pub use memory::{MemoryBackend, MemoryCoordinator, MEMORY_SCHEME};
pub use partitioner::{PartitionCallback, PartitionUpdate, Partitioner};
pub use retry::{retry_transient, RetryPolicy};
