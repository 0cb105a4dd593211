//! Partition ownership under membership churn
//!
//! Each member recomputes its slice of the partition space whenever the
//! group's membership changes. Assignment is eventually exclusive: members
//! observe events at different times, so a partition can briefly have zero
//! or two owners. Work driven by it must be idempotent.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::assignment::PartitionAssigner;
use super::backend::CoordinationEvent;
use super::client::CoordinationClient;
use super::dispatch::{EventHandler, WatchId};
use super::retry::{retry_transient, RetryPolicy};
use crate::error::Result;
use crate::metrics::standard;

/// Assignment handed to partition watchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionUpdate {
    /// Partitions now owned by this member
    pub partitions: Vec<u32>,
    /// Sorted member list the assignment was computed from; `None` standalone
    /// or when replaying the current state to a new watcher
    pub members: Option<Vec<String>>,
    /// Membership event that triggered the recomputation
    pub event: Option<CoordinationEvent>,
}

/// Partition watcher callback
pub type PartitionCallback = Arc<dyn Fn(&PartitionUpdate) + Send + Sync>;

/// Divides a fixed partition space across the live members of a group
pub struct Partitioner {
    coordination: Option<Arc<CoordinationClient>>,
    group_id: String,
    my_id: String,
    assigner: PartitionAssigner,
    retry: RetryPolicy,
    started: AtomicBool,
    my_partitions: RwLock<Vec<u32>>,
    callbacks: Mutex<Vec<PartitionCallback>>,
    watches: Mutex<Vec<WatchId>>,
}

impl Partitioner {
    /// Create a partitioner; `coordination = None` runs standalone.
    pub fn new(
        coordination: Option<Arc<CoordinationClient>>,
        group_id: impl Into<String>,
        my_id: impl Into<String>,
        partitions: Vec<u32>,
    ) -> Arc<Self> {
        let retry = coordination
            .as_ref()
            .map(|c| RetryPolicy::from_config(c.config()))
            .unwrap_or_default();
        Arc::new(Self {
            coordination,
            group_id: group_id.into(),
            my_id: my_id.into(),
            assigner: PartitionAssigner::new(partitions),
            retry,
            started: AtomicBool::new(false),
            my_partitions: RwLock::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            watches: Mutex::new(Vec::new()),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Watch membership and compute the initial assignment.
    ///
    /// Standalone, the whole space is assigned to this member before
    /// returning. Watchers are notified either way.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let Some(client) = self.coordination.clone() else {
            warn!(
                group = %self.group_id,
                "no coordination backend configured, this member owns all partitions"
            );
            let all = self.assigner.partitions().to_vec();
            standard::OWNED_PARTITIONS.set(all.len() as i64);
            *self.my_partitions.write() = all;
            self.started.store(true, Ordering::SeqCst);
            self.run_callbacks(None, None);
            return Ok(());
        };

        let handler: Arc<dyn EventHandler> = self.clone();
        let join = client.watch_join_group(&self.group_id, handler.clone()).await?;
        self.watches.lock().push(join);
        let leave = client.watch_leave_group(&self.group_id, handler).await;
        let refreshed = match leave {
            Ok(leave) => {
                self.watches.lock().push(leave);
                self.refresh(&client).await
            }
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(members) => {
                self.started.store(true, Ordering::SeqCst);
                self.run_callbacks(Some(members), None);
                Ok(())
            }
            Err(e) => {
                self.unwatch_all().await;
                Err(e)
            }
        }
    }

    /// Stop following membership changes and give up every partition.
    pub async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.unwatch_all().await;
        self.my_partitions.write().clear();
        standard::OWNED_PARTITIONS.set(0);
        debug!(group = %self.group_id, member = %self.my_id, "partitioner stopped");
    }

    async fn unwatch_all(&self) {
        let Some(client) = self.coordination.as_ref() else {
            return;
        };
        let watches: Vec<WatchId> = self.watches.lock().drain(..).collect();
        for id in watches {
            if let Err(e) = client.unwatch(id).await {
                warn!(error = %e, group = %self.group_id, "failed to unwatch group");
            }
        }
    }

    /// Partitions currently owned by this member
    pub fn my_partitions(&self) -> Vec<u32> {
        self.my_partitions.read().clone()
    }

    /// Inclusive `(min, max)` of owned partitions, for shard range queries
    pub fn my_shard_range(&self) -> Option<(u32, u32)> {
        let partitions = self.my_partitions.read();
        let min = partitions.iter().min()?;
        let max = partitions.iter().max()?;
        Some((*min, *max))
    }

    /// Whether this member currently owns `partition`
    pub fn owns(&self, partition: u32) -> bool {
        self.my_partitions.read().contains(&partition)
    }

    /// Register a watcher; once started it is called immediately with the
    /// current assignment.
    pub fn watch_partition_change(&self, callback: PartitionCallback) {
        self.callbacks.lock().push(callback.clone());
        if self.is_started() {
            callback(&PartitionUpdate {
                partitions: self.my_partitions(),
                members: None,
                event: None,
            });
        }
    }

    /// Remove a watcher registered with the same `Arc`
    pub fn unwatch_partition_change(&self, callback: &PartitionCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() != before
    }

    /// Fetch members and recompute this member's slice from scratch.
    async fn refresh(&self, client: &CoordinationClient) -> Result<Vec<String>> {
        let members = retry_transient(self.retry, "fetch group members", || {
            client.get_members(&self.group_id)
        })
        .await?;
        let members: Vec<String> = members.into_iter().collect();
        debug!(group = %self.group_id, ?members, "group members");

        if !members.iter().any(|m| *m == self.my_id) {
            warn!(
                group = %self.group_id,
                member = %self.my_id,
                "this member is not in the group, owning no partitions"
            );
        }
        let mine = self.assigner.partitions_for(&self.my_id, &members);

        standard::GROUP_MEMBERS.set(members.len() as i64);
        standard::OWNED_PARTITIONS.set(mine.len() as i64);
        info!(
            group = %self.group_id,
            members = members.len(),
            owned = mine.len(),
            first = ?mine.first(),
            last = ?mine.last(),
            "partitions recomputed"
        );

        *self.my_partitions.write() = mine;
        Ok(members)
    }

    fn run_callbacks(&self, members: Option<Vec<String>>, event: Option<CoordinationEvent>) {
        let callbacks: Vec<PartitionCallback> = self.callbacks.lock().clone();
        let update = PartitionUpdate {
            partitions: self.my_partitions(),
            members,
            event,
        };
        for callback in &callbacks {
            callback(&update);
        }
    }
}

#[async_trait]
impl EventHandler for Partitioner {
    async fn handle(&self, event: &CoordinationEvent) {
        let Some(client) = self.coordination.as_ref() else {
            return;
        };
        if !self.is_started() {
            debug!(?event, "partitioner stopped, ignoring member change");
            return;
        }
        debug!(?event, "received member change");
        match self.refresh(client).await {
            Ok(members) => self.run_callbacks(Some(members), Some(event.clone())),
            Err(e) => error!(
                error = %e,
                group = %self.group_id,
                "failed to recompute partitions, keeping previous assignment"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_standalone_owns_everything() {
        let partitioner = Partitioner::new(None, "producer", "solo:1", (0..8).collect());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        partitioner.watch_partition_change(Arc::new(move |update: &PartitionUpdate| {
            sink.lock().push(update.clone());
        }));
        assert!(seen.lock().is_empty());

        partitioner.start().await.unwrap();

        assert_eq!(partitioner.my_partitions(), (0..8).collect::<Vec<_>>());
        assert_eq!(partitioner.my_shard_range(), Some((0, 7)));
        assert!(partitioner.owns(3));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].members, None);
        assert_eq!(seen[0].event, None);
    }

    #[tokio::test]
    async fn test_unwatch_partition_change() {
        let partitioner = Partitioner::new(None, "producer", "solo:1", (0..4).collect());
        let calls = Arc::new(Mutex::new(0));

        let counter = calls.clone();
        let callback: PartitionCallback = Arc::new(move |_: &PartitionUpdate| *counter.lock() += 1);
        partitioner.watch_partition_change(callback.clone());
        assert!(partitioner.unwatch_partition_change(&callback));
        assert!(!partitioner.unwatch_partition_change(&callback));

        partitioner.start().await.unwrap();
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_stop_gives_up_partitions() {
        let partitioner = Partitioner::new(None, "producer", "solo:1", (0..8).collect());
        partitioner.start().await.unwrap();
        assert!(partitioner.owns(5));

        partitioner.stop().await;
        assert!(!partitioner.is_started());
        assert!(!partitioner.owns(5));
        assert!(partitioner.my_partitions().is_empty());
        assert_eq!(partitioner.my_shard_range(), None);
    }

    #[test]
    fn test_empty_before_start() {
        let partitioner = Partitioner::new(None, "producer", "solo:1", (0..4).collect());
        assert!(partitioner.my_partitions().is_empty());
        assert_eq!(partitioner.my_shard_range(), None);
    }
}
