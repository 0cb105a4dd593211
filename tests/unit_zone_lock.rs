//! Unit tests for zone locking
//!
//! Tests re-entrancy, cross-task exclusion, lock-name derivation and
//! release on failure.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use zonectl_core::config::CoordinationConfig;
use zonectl_core::coordination::{CoordinationClient, MemoryCoordinator, MEMORY_SCHEME};
use zonectl_core::locking::{
    held_locks, is_held, LockArg, ResourceId, ZoneLock, ZoneScoped, NEW_ZONE_LOCK_NAME,
};
use zonectl_core::{Zone, ZoneCtlError};

fn zone_lock_on(coordinator: &Arc<MemoryCoordinator>) -> ZoneLock {
    let client = CoordinationClient::with_backend(
        CoordinationConfig::with_backend(MEMORY_SCHEME),
        Arc::new(coordinator.backend("host-a:1")),
    );
    ZoneLock::new(Arc::new(client))
}

/// Something other than a zone that refers to one
struct RecordSet {
    zone_id: Uuid,
}

impl ZoneScoped for RecordSet {
    fn zone_id(&self) -> Option<Uuid> {
        Some(self.zone_id)
    }
}

#[derive(Debug, PartialEq)]
enum AppError {
    Lock(ZoneCtlError),
    Validation(&'static str),
}

impl From<ZoneCtlError> for AppError {
    fn from(err: ZoneCtlError) -> Self {
        AppError::Lock(err)
    }
}

#[tokio::test]
async fn test_nested_same_zone_does_not_deadlock() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let resource = ResourceId::Zone(Uuid::new_v4());
    let name = resource.lock_name();

    let nested = zone_lock.synchronized(resource, async {
        let outer_held = is_held(&name);
        let inner = zone_lock
            .synchronized(resource, async { Ok::<_, ZoneCtlError>(is_held(&name)) })
            .await?;
        Ok::<_, ZoneCtlError>((outer_held, inner, is_held(&name)))
    });

    let result = tokio::time::timeout(Duration::from_secs(5), nested)
        .await
        .expect("nested synchronized call deadlocked")
        .unwrap();
    assert_eq!(result, (true, true, true));
    assert!(!coordinator.is_locked(&name));
}

#[tokio::test]
async fn test_different_zone_inside_held_lock() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let first = ResourceId::Zone(Uuid::new_v4());
    let second = ResourceId::Zone(Uuid::new_v4());

    let held = zone_lock
        .synchronized(first, async {
            zone_lock
                .synchronized(second, async { Ok::<_, ZoneCtlError>(held_locks()) })
                .await
        })
        .await
        .unwrap();

    assert_eq!(held.len(), 2);
    assert!(held.contains(&first.lock_name()));
    assert!(held.contains(&second.lock_name()));
    assert!(!coordinator.is_locked(&first.lock_name()));
    assert!(!coordinator.is_locked(&second.lock_name()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_zone_serializes_across_tasks() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let resource = ResourceId::Zone(Uuid::new_v4());
    let active = Arc::new(Mutex::new((0usize, 0usize)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let zone_lock = zone_lock.clone();
        let active = active.clone();
        handles.push(tokio::spawn(async move {
            zone_lock
                .synchronized(resource, async {
                    {
                        let mut state = active.lock();
                        state.0 += 1;
                        state.1 = state.1.max(state.0);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.lock().0 -= 1;
                    Ok::<_, ZoneCtlError>(())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(*active.lock(), (0, 1));
}

#[tokio::test]
async fn test_lock_name_derivation_priority() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let positional = Uuid::new_v4();
    let positional_str = positional.to_string();
    let zone = Zone::new("example.org.");
    let records = RecordSet { zone_id: Uuid::new_v4() };
    let explicit = Uuid::new_v4();

    let args = [
        LockArg::Positional(&positional_str),
        LockArg::Object(&zone),
        LockArg::ZoneId(explicit),
    ];
    let held = zone_lock
        .synchronized_zone("update_zone", &args, false, async { Ok::<_, ZoneCtlError>(held_locks()) })
        .await
        .unwrap();
    assert!(held.contains(&ResourceId::Zone(explicit).lock_name()));

    let args = [LockArg::Positional(&positional_str), LockArg::Object(&records)];
    let held = zone_lock
        .synchronized_zone("update_recordset", &args, false, async { Ok::<_, ZoneCtlError>(held_locks()) })
        .await
        .unwrap();
    assert!(held.contains(&ResourceId::Zone(records.zone_id).lock_name()));

    let args = [LockArg::Positional("example.org."), LockArg::Positional(&positional_str)];
    let held = zone_lock
        .synchronized_zone("delete_zone", &args, false, async { Ok::<_, ZoneCtlError>(held_locks()) })
        .await
        .unwrap();
    assert!(held.contains(&ResourceId::Zone(positional).lock_name()));
}

#[tokio::test]
async fn test_unresolved_zone_id_never_runs_operation() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let ran = AtomicBool::new(false);

    let err = zone_lock
        .synchronized_zone("update_zone", &[LockArg::Positional("example.org.")], false, async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, ZoneCtlError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ZoneCtlError::ResourceIdUnresolved {
            operation: "update_zone".into()
        }
    );
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_new_zone_uses_sentinel_lock() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let zone = Zone::new("example.org.");

    let held = zone_lock
        .synchronized_zone("create_zone", &[LockArg::Object(&zone)], true, async {
            Ok::<_, ZoneCtlError>(held_locks())
        })
        .await
        .unwrap();

    assert_eq!(held.len(), 1);
    assert!(held.contains(NEW_ZONE_LOCK_NAME));
}

#[tokio::test]
async fn test_failed_operation_releases_lock() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let resource = ResourceId::Zone(Uuid::new_v4());
    let name = resource.lock_name();

    let err = zone_lock
        .synchronized(resource, async {
            assert!(coordinator.is_locked(&name));
            Err::<(), _>(AppError::Validation("ttl out of range"))
        })
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Validation("ttl out of range"));
    assert!(!coordinator.is_locked(&name));

    let value = zone_lock
        .synchronized(resource, async { Ok::<_, AppError>(1) })
        .await
        .unwrap();
    assert_eq!(value, 1);
}

#[tokio::test]
async fn test_spawned_tasks_do_not_inherit_held_locks() {
    let coordinator = MemoryCoordinator::new();
    let zone_lock = zone_lock_on(&coordinator);
    let resource = ResourceId::Zone(Uuid::new_v4());
    let name = resource.lock_name();

    let spawned_sees = zone_lock
        .synchronized(resource, async {
            let name = name.clone();
            let seen = tokio::spawn(async move { is_held(&name) }).await.unwrap();
            Ok::<_, ZoneCtlError>(seen)
        })
        .await
        .unwrap();
    assert!(!spawned_sees);
}
