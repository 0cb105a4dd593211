//! Per-group leader election
//!
//! Nomination is left to the Coordination Service: registering the
//! elected-as-leader watch makes this member a candidate, and the backend
//! delivers an event when it wins.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::backend::CoordinationEvent;
use super::client::CoordinationClient;
use super::dispatch::{EventHandler, WatchId};
use crate::error::Result;
use crate::metrics::standard;

/// Election watcher callback; the event is `None` standalone or on replay
pub type LeaderCallback = Arc<dyn Fn(Option<&CoordinationEvent>) + Send + Sync>;

/// Leadership state of this member in one group
pub struct LeaderElection {
    coordination: Option<Arc<CoordinationClient>>,
    group_id: String,
    started: AtomicBool,
    leader: AtomicBool,
    callbacks: Mutex<Vec<LeaderCallback>>,
    watch: Mutex<Option<WatchId>>,
}

impl LeaderElection {
    pub fn new(coordination: Option<Arc<CoordinationClient>>, group_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            coordination,
            group_id: group_id.into(),
            started: AtomicBool::new(false),
            leader: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            watch: Mutex::new(None),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Whether this member currently leads the group
    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Enter the election. Standalone, this member becomes leader at once.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let Some(client) = self.coordination.clone() else {
            warn!(
                group = %self.group_id,
                "no coordination backend configured, this member is the leader"
            );
            self.started.store(true, Ordering::SeqCst);
            self.set_leader(true);
            self.run_callbacks(None);
            return Ok(());
        };

        let handler: Arc<dyn EventHandler> = self.clone();
        let id = client.watch_elected_as_leader(&self.group_id, handler).await?;
        *self.watch.lock() = Some(id);
        self.started.store(true, Ordering::SeqCst);
        info!(group = %self.group_id, member = %client.member_id(), "joined leader election");
        Ok(())
    }

    /// Leave the election, resigning first if currently leader.
    ///
    /// The leader flag is cleared even when the backend cannot be reached;
    /// the first backend error is returned after both steps were tried.
    pub async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        let was_leader = self.leader.swap(false, Ordering::SeqCst);
        standard::IS_LEADER.set(0);
        let Some(client) = self.coordination.as_ref() else {
            return Ok(());
        };

        let mut first_error = None;
        let watch = self.watch.lock().take();
        if let Some(id) = watch {
            if let Err(e) = client.unwatch(id).await {
                warn!(group = %self.group_id, error = %e, "failed to leave leader election");
                first_error.get_or_insert(e);
            }
        }
        if was_leader {
            match client.stand_down_group_leader(&self.group_id).await {
                Ok(()) => info!(group = %self.group_id, "stood down as group leader"),
                Err(e) => {
                    warn!(group = %self.group_id, error = %e, "failed to stand down as group leader");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Register a watcher; fires at once if this member already leads.
    pub fn watch_elected_as_leader(&self, callback: LeaderCallback) {
        self.callbacks.lock().push(callback.clone());
        if self.is_started() && self.is_leader() {
            callback(None);
        }
    }

    /// Remove a watcher registered with the same `Arc`
    pub fn unwatch_elected_as_leader(&self, callback: &LeaderCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() != before
    }

    fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
        standard::IS_LEADER.set(i64::from(leader));
    }

    fn run_callbacks(&self, event: Option<&CoordinationEvent>) {
        let callbacks: Vec<LeaderCallback> = self.callbacks.lock().clone();
        for callback in &callbacks {
            callback(event);
        }
    }
}

#[async_trait]
impl EventHandler for LeaderElection {
    async fn handle(&self, event: &CoordinationEvent) {
        info!(group = %self.group_id, member = %event.member(), "elected as group leader");
        self.set_leader(true);
        self.run_callbacks(Some(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinationConfig;
    use crate::coordination::backend::CoordinationBackend;
    use crate::coordination::memory::{MemoryCoordinator, MEMORY_SCHEME};
    use crate::error::ZoneCtlError;

    #[tokio::test]
    async fn test_standalone_is_leader_immediately() {
        let election = LeaderElection::new(None, "zonectl");
        let fired = Arc::new(Mutex::new(Vec::new()));

        let sink = fired.clone();
        election.watch_elected_as_leader(Arc::new(move |event: Option<&CoordinationEvent>| {
            sink.lock().push(event.cloned());
        }));
        assert!(!election.is_leader());

        election.start().await.unwrap();
        assert!(election.is_leader());
        assert_eq!(*fired.lock(), vec![None]);

        election.stop().await.unwrap();
        assert!(!election.is_leader());
    }

    fn quiet_client(coordinator: &Arc<MemoryCoordinator>, member: &str) -> Arc<CoordinationClient> {
        let mut config = CoordinationConfig::with_backend(MEMORY_SCHEME);
        config.heartbeat_interval_secs = 3600;
        config.run_watchers_interval_secs = 3600;
        Arc::new(CoordinationClient::with_backend(config, Arc::new(coordinator.backend(member))))
    }

    #[tokio::test]
    async fn test_watcher_registered_after_election_fires() {
        let coordinator = MemoryCoordinator::new();
        let client = quiet_client(&coordinator, "host-a:1");
        client.start().await.unwrap();
        let election = LeaderElection::new(Some(client.clone()), "zonectl");
        election.start().await.unwrap();
        client.run_watchers().await.unwrap();
        assert!(election.is_leader());

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        election.watch_elected_as_leader(Arc::new(move |event: Option<&CoordinationEvent>| {
            sink.lock().push(event.cloned());
        }));
        assert_eq!(*fired.lock(), vec![None]);

        election.stop().await.unwrap();
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stop_clears_leadership_when_backend_is_gone() {
        let coordinator = MemoryCoordinator::new();
        let backend = coordinator.backend("host-a:1");
        let client = Arc::new(CoordinationClient::with_backend(
            CoordinationConfig::with_backend(MEMORY_SCHEME),
            Arc::new(backend.clone()),
        ));
        client.start().await.unwrap();
        let election = LeaderElection::new(Some(client.clone()), "zonectl");
        election.start().await.unwrap();
        client.run_watchers().await.unwrap();
        assert!(election.is_leader());

        backend.stop().await.unwrap();
        let err = election.stop().await.unwrap_err();
        assert!(matches!(err, ZoneCtlError::ConnectionFailed { .. }));
        assert!(!election.is_leader());
        assert!(!election.is_started());

        client.stop().await;
    }

    #[tokio::test]
    async fn test_late_watcher_fires_when_leader() {
        let election = LeaderElection::new(None, "zonectl");
        election.start().await.unwrap();

        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        let callback: LeaderCallback = Arc::new(move |_: Option<&CoordinationEvent>| *counter.lock() += 1);
        election.watch_elected_as_leader(callback.clone());
        assert_eq!(*fired.lock(), 1);

        assert!(election.unwatch_elected_as_leader(&callback));
        assert!(!election.unwatch_elected_as_leader(&callback));
    }
}
