//! Coordination client
//!
//! Lifecycle wrapper around a [`CoordinationBackend`]: connect (retrying
//! forever), create and join the service group, run the heartbeat and
//! watch-dispatch tasks, and leave/disconnect on stop. Without a backend the
//! client runs standalone and hands out process-local locks.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::backend::{CoordinationBackend, DistributedLock, EventKind};
use super::dispatch::{Dispatcher, EventHandler, WatchId};
use super::member::MemberId;
use super::memory::{MemoryCoordinator, MEMORY_SCHEME};
use super::retry::{retry_transient, RetryPolicy};
use crate::config::CoordinationConfig;
use crate::error::{Result, ZoneCtlError};
use crate::metrics::standard;
use crate::runtime::ShutdownSignal;

/// Client-side handle to the Coordination Service
pub struct CoordinationClient {
    config: CoordinationConfig,
    member_id: MemberId,
    backend: Option<Arc<dyn CoordinationBackend>>,
    /// Locks handed out when no backend is configured
    local_locks: Arc<MemoryCoordinator>,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
    started: AtomicBool,
    /// Held for the whole of `start`; `stop` waits on it
    lifecycle: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoordinationClient {
    /// Create a client for `config.backend_url`.
    ///
    /// An empty URL yields a standalone client, `memory://` an in-process
    /// coordinator private to this client.
    pub fn new(config: CoordinationConfig, member_id: MemberId) -> Result<Self> {
        let url = config.backend_url.trim();
        let backend: Option<Arc<dyn CoordinationBackend>> = if url.is_empty() {
            None
        } else if url.starts_with(MEMORY_SCHEME) {
            Some(Arc::new(MemoryCoordinator::new().backend(member_id.as_str())))
        } else {
            return Err(ZoneCtlError::UnsupportedBackend { url: url.to_string() });
        };
        Ok(Self::build(config, member_id, backend))
    }

    /// Create a client over an existing backend handle
    pub fn with_backend(config: CoordinationConfig, backend: Arc<dyn CoordinationBackend>) -> Self {
        let member_id = MemberId::new(backend.member_id());
        Self::build(config, member_id, Some(backend))
    }

    /// Client with no backend
    pub fn standalone(member_id: MemberId) -> Self {
        Self::build(CoordinationConfig::standalone(), member_id, None)
    }

    fn build(
        config: CoordinationConfig,
        member_id: MemberId,
        backend: Option<Arc<dyn CoordinationBackend>>,
    ) -> Self {
        Self {
            config,
            member_id,
            backend,
            local_locks: MemoryCoordinator::new(),
            dispatcher: Arc::new(Dispatcher::new()),
            shutdown: ShutdownSignal::new(),
            started: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn is_standalone(&self) -> bool {
        self.backend.is_none()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Signal that stops the background tasks and the connect loop
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Connect, create/join the group and start the background tasks.
    ///
    /// Blocks until the backend accepts the connection or `stop` is called.
    /// A stopped client cannot be restarted.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(backend) = self.backend.clone() else {
            if !self.started.swap(true, Ordering::SeqCst) {
                warn!(
                    member = %self.member_id,
                    "no coordination backend configured, running as the only member"
                );
            }
            return Ok(());
        };
        if self.is_started() {
            return Ok(());
        }

        self.connect(backend.as_ref()).await?;

        let group = self.config.group_id.clone();
        let policy = RetryPolicy::from_config(&self.config);
        retry_transient(policy, "create group", || self.create_group(&group)).await?;
        retry_transient(policy, "join group", || self.join_group(&group)).await?;

        // stop() ran while we were joining and is waiting on us
        if self.shutdown.is_triggered() {
            info!(member = %self.member_id, group = %group, "stopped while joining, leaving again");
            self.disconnect(backend.as_ref()).await;
            return Err(ZoneCtlError::ShutdownInProgress);
        }

        self.spawn_background_tasks(backend);
        self.started.store(true, Ordering::SeqCst);
        info!(member = %self.member_id, group = %group, "coordination started");
        Ok(())
    }

    async fn connect(&self, backend: &dyn CoordinationBackend) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        let retry = self.config.connect_retry();
        let mut attempt: u64 = 0;
        loop {
            if self.shutdown.is_triggered() {
                return Err(ZoneCtlError::ShutdownInProgress);
            }
            attempt += 1;
            standard::COORDINATION_CONNECT_ATTEMPTS.inc();
            match backend.start().await {
                Ok(()) => {
                    info!(
                        member = %self.member_id,
                        backend = %self.config.backend_url,
                        attempt,
                        "connected to coordination backend"
                    );
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempt,
                        retry_in_secs = retry.as_secs(),
                        "failed to start coordination backend, retrying"
                    );
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                _ = shutdown.recv() => return Err(ZoneCtlError::ShutdownInProgress),
            }
        }
    }

    fn spawn_background_tasks(&self, backend: Arc<dyn CoordinationBackend>) {
        let heartbeat = tokio::spawn(heartbeat_loop(
            backend.clone(),
            self.config.heartbeat_interval(),
            self.shutdown.subscribe(),
        ));
        let watchers = tokio::spawn(watch_loop(
            backend,
            self.dispatcher.clone(),
            self.config.run_watchers_interval(),
            self.shutdown.subscribe(),
        ));
        self.tasks.lock().extend([heartbeat, watchers]);
    }

    /// Leave the group and disconnect. Safe to call more than once.
    ///
    /// A concurrent `start` is interrupted and finishes its own cleanup
    /// before this returns.
    pub async fn stop(&self) {
        self.shutdown.shutdown();
        let _lifecycle = self.lifecycle.lock().await;
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "coordination background task ended abnormally");
            }
        }
        self.disconnect(backend.as_ref()).await;
    }

    async fn disconnect(&self, backend: &dyn CoordinationBackend) {
        match backend.leave_group(&self.config.group_id).await {
            Ok(()) => info!(member = %self.member_id, group = %self.config.group_id, "left coordination group"),
            Err(e) if e.is_structural() || matches!(e, ZoneCtlError::MemberNotJoined { .. }) => {
                debug!(error = %e, "group already left")
            }
            Err(e) => warn!(error = %e, "failed to leave coordination group"),
        }
        if let Err(e) = backend.stop().await {
            warn!(error = %e, "failed to stop coordination backend");
        }
    }

    /// Create `group`, treating "already exists" as success.
    pub async fn create_group(&self, group: &str) -> Result<()> {
        let backend = self.require_backend()?;
        match backend.create_group(group).await {
            Ok(()) => {
                info!(group, "created coordination group");
                Ok(())
            }
            Err(ZoneCtlError::GroupAlreadyExists { .. }) => {
                debug!(group, "coordination group already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn join_group(&self, group: &str) -> Result<()> {
        self.require_backend()?.join_group(group).await?;
        info!(member = %self.member_id, group, "joined coordination group");
        Ok(())
    }

    pub async fn leave_group(&self, group: &str) -> Result<()> {
        self.require_backend()?.leave_group(group).await
    }

    /// Current members; standalone clients are the only member.
    pub async fn get_members(&self, group: &str) -> Result<BTreeSet<String>> {
        match self.backend.as_ref() {
            Some(backend) => backend.get_members(group).await,
            None => Ok(BTreeSet::from([self.member_id.to_string()])),
        }
    }

    pub async fn watch_join_group(&self, group: &str, handler: Arc<dyn EventHandler>) -> Result<WatchId> {
        self.watch(group, EventKind::Join, handler).await
    }

    pub async fn watch_leave_group(&self, group: &str, handler: Arc<dyn EventHandler>) -> Result<WatchId> {
        self.watch(group, EventKind::Leave, handler).await
    }

    pub async fn watch_elected_as_leader(&self, group: &str, handler: Arc<dyn EventHandler>) -> Result<WatchId> {
        self.watch(group, EventKind::Elected, handler).await
    }

    async fn watch(&self, group: &str, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<WatchId> {
        let backend = self.require_backend()?;
        let (id, first) = self.dispatcher.register(group, kind, handler);
        if first {
            let subscribed = match kind {
                EventKind::Join => backend.watch_join_group(group).await,
                EventKind::Leave => backend.watch_leave_group(group).await,
                EventKind::Elected => backend.watch_elected_as_leader(group).await,
            };
            if let Err(e) = subscribed {
                self.dispatcher.unregister(id);
                return Err(e);
            }
        }
        debug!(group, ?kind, "registered coordination watch");
        Ok(id)
    }

    /// Remove a watch; the backend subscription goes with the last handler.
    pub async fn unwatch(&self, id: WatchId) -> Result<()> {
        let Some((group, kind, last)) = self.dispatcher.unregister(id) else {
            return Ok(());
        };
        if let (true, Some(backend)) = (last, self.backend.as_ref()) {
            match kind {
                EventKind::Join => backend.unwatch_join_group(&group).await?,
                EventKind::Leave => backend.unwatch_leave_group(&group).await?,
                EventKind::Elected => backend.unwatch_elected_as_leader(&group).await?,
            }
        }
        Ok(())
    }

    pub async fn stand_down_group_leader(&self, group: &str) -> Result<()> {
        self.require_backend()?.stand_down_group_leader(group).await
    }

    /// Poll the backend once and dispatch every pending event.
    pub async fn run_watchers(&self) -> Result<usize> {
        match self.backend.as_ref() {
            Some(backend) => poll_and_dispatch(backend.as_ref(), &self.dispatcher).await,
            None => Ok(0),
        }
    }

    /// Lock handle for `name`; process-local when standalone.
    pub fn get_lock(&self, name: &str) -> Arc<dyn DistributedLock> {
        match self.backend.as_ref() {
            Some(backend) => backend.get_lock(name),
            None => self.local_locks.lock(name),
        }
    }

    fn require_backend(&self) -> Result<&Arc<dyn CoordinationBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ZoneCtlError::Config("no coordination backend configured".into()))
    }
}

async fn poll_and_dispatch(backend: &dyn CoordinationBackend, dispatcher: &Dispatcher) -> Result<usize> {
    let events = backend.run_watchers().await?;
    for event in &events {
        dispatcher.dispatch(event).await;
    }
    Ok(events.len())
}

async fn heartbeat_loop(
    backend: Arc<dyn CoordinationBackend>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = backend.heartbeat().await {
                    standard::HEARTBEAT_FAILURES.inc();
                    warn!(error = %e, "coordination heartbeat failed");
                }
            }
        }
    }
    debug!("heartbeat task stopped");
}

async fn watch_loop(
    backend: Arc<dyn CoordinationBackend>,
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = poll_and_dispatch(backend.as_ref(), &dispatcher).await {
                    warn!(error = %e, "failed to run coordination watchers");
                }
            }
        }
    }
    debug!("watch dispatch task stopped");
}
