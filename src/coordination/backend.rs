//! Coordination Service contract
//!
//! The narrow surface needed from a group-membership / locking backend.
//! Backends only queue events; [`CoordinationClient`](super::CoordinationClient)
//! polls them with `run_watchers` and owns callback dispatch.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Result;

/// Kind of event a watch subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Leave,
    Elected,
}

/// Event delivered by `run_watchers`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationEvent {
    /// A member joined a watched group
    MemberJoined { group: String, member: String },
    /// A member left (or expired from) a watched group
    MemberLeft { group: String, member: String },
    /// This member was elected leader of the group
    LeaderElected { group: String, member: String },
}

impl CoordinationEvent {
    /// Group the event belongs to
    pub fn group(&self) -> &str {
        match self {
            CoordinationEvent::MemberJoined { group, .. }
            | CoordinationEvent::MemberLeft { group, .. }
            | CoordinationEvent::LeaderElected { group, .. } => group,
        }
    }

    /// Member the event is about
    pub fn member(&self) -> &str {
        match self {
            CoordinationEvent::MemberJoined { member, .. }
            | CoordinationEvent::MemberLeft { member, .. }
            | CoordinationEvent::LeaderElected { member, .. } => member,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            CoordinationEvent::MemberJoined { .. } => EventKind::Join,
            CoordinationEvent::MemberLeft { .. } => EventKind::Leave,
            CoordinationEvent::LeaderElected { .. } => EventKind::Elected,
        }
    }
}

/// Named mutual-exclusion lock obtained from the backend.
///
/// `acquire` blocks until the lock is granted; bounded waiting is a backend
/// setting.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self) -> Result<()>;

    async fn release(&self) -> Result<()>;
}

/// Client-side view of a Coordination Service.
///
/// Errors follow the crate taxonomy: `Coordination` / `ConnectionFailed` are
/// transient, `GroupNotCreated` is structural, `GroupAlreadyExists` is
/// returned by `create_group` and absorbed by the client.
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Identity this backend handle acts as
    fn member_id(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn create_group(&self, group: &str) -> Result<()>;

    async fn join_group(&self, group: &str) -> Result<()>;

    async fn leave_group(&self, group: &str) -> Result<()>;

    async fn get_members(&self, group: &str) -> Result<BTreeSet<String>>;

    async fn watch_join_group(&self, group: &str) -> Result<()>;

    async fn unwatch_join_group(&self, group: &str) -> Result<()>;

    async fn watch_leave_group(&self, group: &str) -> Result<()>;

    async fn unwatch_leave_group(&self, group: &str) -> Result<()>;

    /// Nominate this member; the backend decides who wins
    async fn watch_elected_as_leader(&self, group: &str) -> Result<()>;

    async fn unwatch_elected_as_leader(&self, group: &str) -> Result<()>;

    async fn stand_down_group_leader(&self, group: &str) -> Result<()>;

    async fn heartbeat(&self) -> Result<()>;

    /// Drain pending events for this member's watches
    async fn run_watchers(&self) -> Result<Vec<CoordinationEvent>>;

    fn get_lock(&self, name: &str) -> Arc<dyn DistributedLock>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = CoordinationEvent::MemberJoined {
            group: "central".into(),
            member: "host-a:1".into(),
        };
        assert_eq!(event.group(), "central");
        assert_eq!(event.member(), "host-a:1");
        assert_eq!(event.kind(), EventKind::Join);

        let event = CoordinationEvent::LeaderElected {
            group: "producer".into(),
            member: "host-b:2".into(),
        };
        assert_eq!(event.kind(), EventKind::Elected);
    }
}
