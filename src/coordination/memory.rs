//! In-process Coordination Service
//!
//! A shared [`MemoryCoordinator`] holds groups, members, leaders and locks;
//! each worker talks to it through its own [`MemoryBackend`] handle. Members
//! that stop heartbeating are expired after `member_timeout`, leaders are
//! elected first-poller-wins, and `fail_next` injects transient errors.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{CoordinationBackend, CoordinationEvent, DistributedLock};
use crate::error::{Result, ZoneCtlError};

/// URL scheme selecting the in-process backend.
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Default)]
struct GroupState {
    members: BTreeSet<String>,
    join_watchers: BTreeSet<String>,
    leave_watchers: BTreeSet<String>,
    candidates: BTreeSet<String>,
    leader: Option<String>,
}

#[derive(Default)]
struct State {
    /// Connected members and their last heartbeat
    connected: HashMap<String, Instant>,
    groups: HashMap<String, GroupState>,
    /// Pending events per member
    queues: HashMap<String, VecDeque<CoordinationEvent>>,
    /// Lock name -> holding handle
    locks: HashMap<String, u64>,
    injected_failures: u32,
}

impl State {
    fn take_injected_failure(&mut self, operation: &str) -> Result<()> {
        if self.injected_failures > 0 {
            self.injected_failures -= 1;
            return Err(ZoneCtlError::Coordination {
                message: format!("injected failure during {}", operation),
            });
        }
        Ok(())
    }

    fn require_connected(&self, member: &str) -> Result<()> {
        if self.connected.contains_key(member) {
            Ok(())
        } else {
            Err(ZoneCtlError::ConnectionFailed {
                endpoint: MEMORY_SCHEME.into(),
                reason: format!("member {} is not connected", member),
            })
        }
    }

    fn group_mut(&mut self, group: &str) -> Result<&mut GroupState> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| ZoneCtlError::GroupNotCreated { group: group.into() })
    }

    /// Remove `member` from `group`, notifying the remaining leave watchers.
    fn remove_member(&mut self, group_name: &str, member: &str) -> bool {
        let Some(group) = self.groups.get_mut(group_name) else {
            return false;
        };
        if !group.members.remove(member) {
            return false;
        }
        if group.leader.as_deref() == Some(member) {
            group.leader = None;
        }
        let event = CoordinationEvent::MemberLeft {
            group: group_name.into(),
            member: member.into(),
        };
        for watcher in group.leave_watchers.iter().filter(|w| w.as_str() != member) {
            self.queues
                .entry(watcher.clone())
                .or_default()
                .push_back(event.clone());
        }
        true
    }

    fn disconnect(&mut self, member: &str) {
        let names: Vec<String> = self.groups.keys().cloned().collect();
        for name in &names {
            self.remove_member(name, member);
            if let Some(group) = self.groups.get_mut(name) {
                group.join_watchers.remove(member);
                group.leave_watchers.remove(member);
                group.candidates.remove(member);
            }
        }
        self.connected.remove(member);
        self.queues.remove(member);
    }

    fn expire(&mut self, timeout: Option<Duration>, now: Instant) {
        let Some(timeout) = timeout else {
            return;
        };
        let stale: Vec<String> = self
            .connected
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > timeout)
            .map(|(member, _)| member.clone())
            .collect();
        for member in stale {
            warn!(member = %member, "member heartbeat expired, removing from all groups");
            self.disconnect(&member);
        }
    }
}

/// Shared state of an in-process Coordination Service
pub struct MemoryCoordinator {
    state: Mutex<State>,
    lock_released: Notify,
    member_timeout: Option<Duration>,
    next_lock_handle: AtomicU64,
}

impl MemoryCoordinator {
    /// Coordinator whose members never expire
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            lock_released: Notify::new(),
            member_timeout: None,
            next_lock_handle: AtomicU64::new(1),
        })
    }

    /// Coordinator that forgets members silent for longer than `timeout`
    pub fn with_member_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            lock_released: Notify::new(),
            member_timeout: Some(timeout),
            next_lock_handle: AtomicU64::new(1),
        })
    }

    /// Backend handle acting as `member`
    pub fn backend(self: &Arc<Self>, member: impl Into<String>) -> MemoryBackend {
        MemoryBackend {
            coordinator: self.clone(),
            member: member.into(),
        }
    }

    /// Fresh lock handle for `name`
    pub fn lock(self: &Arc<Self>, name: &str) -> Arc<dyn DistributedLock> {
        Arc::new(MemoryLock {
            coordinator: self.clone(),
            name: name.to_string(),
            handle: self.next_lock_handle.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Make the next `count` backend calls fail with a transient error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().injected_failures = count;
    }

    pub fn members(&self, group: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .groups
            .get(group)
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }

    pub fn leader(&self, group: &str) -> Option<String> {
        self.state.lock().groups.get(group).and_then(|g| g.leader.clone())
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.state.lock().locks.contains_key(name)
    }

    /// Run heartbeat expiry now
    pub fn expire_stale_members(&self) {
        self.state.lock().expire(self.member_timeout, Instant::now());
    }

    async fn acquire_lock(&self, name: &str, handle: u64) {
        loop {
            let notified = self.lock_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                match state.locks.get(name) {
                    None => {
                        state.locks.insert(name.to_string(), handle);
                        return;
                    }
                    Some(holder) if *holder == handle => return,
                    Some(_) => {}
                }
            }
            notified.await;
        }
    }

    fn release_lock(&self, name: &str, handle: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.locks.get(name) != Some(&handle) {
            return Err(ZoneCtlError::LockNotHeld { name: name.into() });
        }
        state.locks.remove(name);
        drop(state);
        self.lock_released.notify_waiters();
        Ok(())
    }
}

/// A single member's connection to a [`MemoryCoordinator`]
#[derive(Clone)]
pub struct MemoryBackend {
    coordinator: Arc<MemoryCoordinator>,
    member: String,
}

impl MemoryBackend {
    pub fn coordinator(&self) -> &Arc<MemoryCoordinator> {
        &self.coordinator
    }

    fn with_group<F>(&self, group: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut GroupState, &str),
    {
        let mut state = self.coordinator.state.lock();
        state.require_connected(&self.member)?;
        let group = state.group_mut(group)?;
        f(group, &self.member);
        Ok(())
    }
}

#[async_trait]
impl CoordinationBackend for MemoryBackend {
    fn member_id(&self) -> &str {
        &self.member
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.coordinator.state.lock();
        state.take_injected_failure("start")?;
        state.connected.insert(self.member.clone(), Instant::now());
        state.queues.entry(self.member.clone()).or_default();
        debug!(member = %self.member, "memory backend connected");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.coordinator.state.lock().disconnect(&self.member);
        debug!(member = %self.member, "memory backend disconnected");
        Ok(())
    }

    async fn create_group(&self, group: &str) -> Result<()> {
        let mut state = self.coordinator.state.lock();
        state.require_connected(&self.member)?;
        if state.groups.contains_key(group) {
            return Err(ZoneCtlError::GroupAlreadyExists { group: group.into() });
        }
        state.groups.insert(group.to_string(), GroupState::default());
        Ok(())
    }

    async fn join_group(&self, group_name: &str) -> Result<()> {
        let mut state = self.coordinator.state.lock();
        state.take_injected_failure("join_group")?;
        state.require_connected(&self.member)?;
        let group = state.group_mut(group_name)?;
        if !group.members.insert(self.member.clone()) {
            return Ok(());
        }
        let watchers: Vec<String> = group.join_watchers.iter().cloned().collect();
        let event = CoordinationEvent::MemberJoined {
            group: group_name.into(),
            member: self.member.clone(),
        };
        for watcher in watchers {
            state.queues.entry(watcher).or_default().push_back(event.clone());
        }
        Ok(())
    }

    async fn leave_group(&self, group: &str) -> Result<()> {
        let mut state = self.coordinator.state.lock();
        if !state.groups.contains_key(group) {
            return Err(ZoneCtlError::GroupNotCreated { group: group.into() });
        }
        if !state.remove_member(group, &self.member) {
            return Err(ZoneCtlError::MemberNotJoined {
                group: group.into(),
                member: self.member.clone(),
            });
        }
        Ok(())
    }

    async fn get_members(&self, group: &str) -> Result<BTreeSet<String>> {
        let mut state = self.coordinator.state.lock();
        state.take_injected_failure("get_members")?;
        state.expire(self.coordinator.member_timeout, Instant::now());
        state
            .groups
            .get(group)
            .map(|g| g.members.clone())
            .ok_or_else(|| ZoneCtlError::GroupNotCreated { group: group.into() })
    }

    async fn watch_join_group(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.join_watchers.insert(member.to_string());
        })
    }

    async fn unwatch_join_group(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.join_watchers.remove(member);
        })
    }

    async fn watch_leave_group(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.leave_watchers.insert(member.to_string());
        })
    }

    async fn unwatch_leave_group(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.leave_watchers.remove(member);
        })
    }

    async fn watch_elected_as_leader(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.candidates.insert(member.to_string());
        })
    }

    async fn unwatch_elected_as_leader(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            g.candidates.remove(member);
        })
    }

    async fn stand_down_group_leader(&self, group: &str) -> Result<()> {
        self.with_group(group, |g, member| {
            if g.leader.as_deref() == Some(member) {
                info!(member = %member, "leader standing down");
                g.leader = None;
            }
        })
    }

    async fn heartbeat(&self) -> Result<()> {
        let mut state = self.coordinator.state.lock();
        state.take_injected_failure("heartbeat")?;
        state.require_connected(&self.member)?;
        state.connected.insert(self.member.clone(), Instant::now());
        Ok(())
    }

    async fn run_watchers(&self) -> Result<Vec<CoordinationEvent>> {
        let mut state = self.coordinator.state.lock();
        state.take_injected_failure("run_watchers")?;
        state.expire(self.coordinator.member_timeout, Instant::now());
        state.require_connected(&self.member)?;

        let mut elected = Vec::new();
        for (name, group) in state.groups.iter_mut() {
            if group.leader.is_none()
                && group.candidates.contains(&self.member)
                && group.members.contains(&self.member)
            {
                group.leader = Some(self.member.clone());
                elected.push(CoordinationEvent::LeaderElected {
                    group: name.clone(),
                    member: self.member.clone(),
                });
            }
        }

        let queue = state.queues.entry(self.member.clone()).or_default();
        queue.extend(elected);
        Ok(queue.drain(..).collect())
    }

    fn get_lock(&self, name: &str) -> Arc<dyn DistributedLock> {
        self.coordinator.lock(name)
    }
}

/// Lock handle on a [`MemoryCoordinator`]
struct MemoryLock {
    coordinator: Arc<MemoryCoordinator>,
    name: String,
    handle: u64,
}

#[async_trait]
impl DistributedLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> Result<()> {
        self.coordinator.acquire_lock(&self.name, self.handle).await;
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.coordinator.release_lock(&self.name, self.handle)
    }
}
