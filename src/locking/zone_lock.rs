//! Per-zone distributed mutual exclusion
//!
//! Every mutating zone operation runs inside [`ZoneLock::synchronized`].
//! The names of locks held by the current task are kept in a task-local
//! set, so an operation that calls another operation on the same zone
//! re-enters instead of deadlocking on itself. The set is not inherited by
//! tasks spawned from inside the guarded future.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::resource::{LockArg, ResourceId};
use crate::coordination::{CoordinationClient, DistributedLock};
use crate::error::ZoneCtlError;
use crate::metrics::standard;

tokio::task_local! {
    static HELD_LOCKS: HashSet<String>;
}

/// Whether the current task holds the lock named `name`
pub fn is_held(name: &str) -> bool {
    HELD_LOCKS.try_with(|held| held.contains(name)).unwrap_or(false)
}

/// Lock names held by the current task
pub fn held_locks() -> HashSet<String> {
    HELD_LOCKS.try_with(Clone::clone).unwrap_or_default()
}

/// Zone lock backed by the coordination client's named locks
#[derive(Clone)]
pub struct ZoneLock {
    coordination: Arc<CoordinationClient>,
}

impl ZoneLock {
    pub fn new(coordination: Arc<CoordinationClient>) -> Self {
        Self { coordination }
    }

    /// Run `operation` while holding the lock for `resource`.
    ///
    /// Waits for the lock as long as the backend makes it wait. The lock is
    /// released whether the operation succeeds or fails; a release failure
    /// is logged and does not replace the operation's result.
    pub async fn synchronized<F, T, E>(&self, resource: ResourceId, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ZoneCtlError>,
    {
        let name = resource.lock_name();
        if is_held(&name) {
            standard::REENTRANT_LOCK_HITS.inc();
            debug!(lock = %name, "lock already held by this task, re-entering");
            return operation.await;
        }

        let lock = self.coordination.get_lock(&name);
        let waited = Instant::now();
        lock.acquire().await.map_err(E::from)?;
        standard::ZONE_LOCKS_ACQUIRED.inc();
        standard::LOCK_WAIT_DURATION.observe(waited.elapsed().as_secs_f64());
        debug!(lock = %name, "acquired zone lock");

        let guard = ReleaseGuard {
            name: name.clone(),
            lock: Some(lock),
        };
        let mut held = held_locks();
        held.insert(name);
        let result = HELD_LOCKS.scope(held, operation).await;
        guard.release().await;
        result
    }

    /// Derive the resource from `args` and run `operation` under its lock.
    ///
    /// Fails with `ResourceIdUnresolved` before running anything when no
    /// zone id can be found and `new_zone` is false.
    pub async fn synchronized_zone<F, T, E>(
        &self,
        operation_name: &str,
        args: &[LockArg<'_>],
        new_zone: bool,
        operation: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ZoneCtlError>,
    {
        let resource = ResourceId::derive(operation_name, args, new_zone).map_err(E::from)?;
        debug!(operation = operation_name, resource = %resource, "synchronizing zone operation");
        self.synchronized(resource, operation).await
    }
}

/// Releases the lock once the guarded future finishes or is dropped.
struct ReleaseGuard {
    name: String,
    lock: Option<Arc<dyn DistributedLock>>,
}

impl ReleaseGuard {
    async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            match lock.release().await {
                Ok(()) => debug!(lock = %self.name, "released zone lock"),
                Err(e) => warn!(lock = %self.name, error = %e, "failed to release zone lock"),
            }
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release().await {
                        warn!(lock = %name, error = %e, "failed to release zone lock after cancellation");
                    }
                });
            }
            Err(_) => warn!(lock = %name, "zone lock dropped outside a runtime, left to backend expiry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemberId;
    use uuid::Uuid;

    fn standalone_lock() -> ZoneLock {
        ZoneLock::new(Arc::new(CoordinationClient::standalone(MemberId::new("solo:1"))))
    }

    #[tokio::test]
    async fn test_held_only_inside_scope() {
        let zone_lock = standalone_lock();
        let resource = ResourceId::Zone(Uuid::new_v4());
        let name = resource.lock_name();

        assert!(!is_held(&name));
        let inside = zone_lock
            .synchronized(resource, async { Ok::<_, ZoneCtlError>(is_held(&name)) })
            .await
            .unwrap();
        assert!(inside);
        assert!(!is_held(&name));
        assert!(held_locks().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_operation_releases_lock() {
        let zone_lock = standalone_lock();
        let resource = ResourceId::Zone(Uuid::new_v4());

        let pending = zone_lock.synchronized(resource, async {
            std::future::pending::<()>().await;
            Ok::<_, ZoneCtlError>(())
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        let again = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            zone_lock.synchronized(resource, async { Ok::<_, ZoneCtlError>(7) }),
        )
        .await;
        assert_eq!(again.unwrap().unwrap(), 7);
    }
}
