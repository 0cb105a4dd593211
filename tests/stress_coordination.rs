//! Stress tests for coordination under membership churn
//!
//! Run with: cargo test --release --test stress_coordination -- --nocapture

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zonectl_core::config::CoordinationConfig;
use zonectl_core::coordination::{
    CoordinationClient, LeaderElection, MemoryCoordinator, Partitioner, MEMORY_SCHEME,
};
use zonectl_core::locking::{ResourceId, ZoneLock};
use zonectl_core::ZoneCtlError;

const GROUP: &str = "zonectl";
const PARTITIONS: u32 = 4096;

fn quiet_config() -> CoordinationConfig {
    let mut config = CoordinationConfig::with_backend(MEMORY_SCHEME);
    config.heartbeat_interval_secs = 3600;
    config.run_watchers_interval_secs = 3600;
    config
}

struct Worker {
    client: Arc<CoordinationClient>,
    partitioner: Arc<Partitioner>,
}

async fn start_worker(coordinator: &Arc<MemoryCoordinator>, member: &str) -> Worker {
    let client = Arc::new(CoordinationClient::with_backend(
        quiet_config(),
        Arc::new(coordinator.backend(member)),
    ));
    client.start().await.unwrap();
    let partitioner = Partitioner::new(Some(client.clone()), GROUP, member, (0..PARTITIONS).collect());
    partitioner.start().await.unwrap();
    Worker { client, partitioner }
}

async fn settle(workers: &[Worker]) {
    for worker in workers {
        worker.client.run_watchers().await.unwrap();
    }
}

fn assert_exact_cover(workers: &[Worker]) {
    let mut seen = BTreeSet::new();
    let mut total = 0;
    for worker in workers {
        let mine = worker.partitioner.my_partitions();
        total += mine.len();
        seen.extend(mine);
    }
    assert_eq!(total, PARTITIONS as usize, "some partition has two owners");
    assert_eq!(seen.len(), PARTITIONS as usize, "some partition has no owner");
}

/// Workers joining and leaving converge on an exact cover once every
/// member has dispatched its pending events.
#[tokio::test]
async fn stress_membership_churn() {
    let coordinator = MemoryCoordinator::new();
    let start = Instant::now();

    let mut workers = Vec::new();
    for i in 0..12 {
        workers.push(start_worker(&coordinator, &format!("worker-{:02}", i)).await);
    }
    settle(&workers).await;
    assert_exact_cover(&workers);

    for _ in 0..5 {
        let leaving = workers.remove(3);
        leaving.partitioner.stop().await;
        leaving.client.stop().await;
    }
    settle(&workers).await;
    assert_exact_cover(&workers);

    for i in 12..15 {
        workers.push(start_worker(&coordinator, &format!("worker-{:02}", i)).await);
    }
    settle(&workers).await;
    assert_exact_cover(&workers);
    assert_eq!(coordinator.members(GROUP).len(), 10);

    println!("Membership churn stress test:");
    println!("  Final members: {}", workers.len());
    println!("  Elapsed: {:?}", start.elapsed());

    for worker in &workers {
        worker.partitioner.stop().await;
        worker.client.stop().await;
    }
}

/// Silent members are expired and their partitions picked up by the rest.
#[tokio::test(start_paused = true)]
async fn stress_heartbeat_expiry() {
    let coordinator = MemoryCoordinator::with_member_timeout(Duration::from_secs(30));

    let mut config = CoordinationConfig::with_backend(MEMORY_SCHEME);
    config.run_watchers_interval_secs = 3600;
    let live = Arc::new(CoordinationClient::with_backend(
        config,
        Arc::new(coordinator.backend("worker-a")),
    ));
    live.start().await.unwrap();
    let partitioner = Partitioner::new(Some(live.clone()), GROUP, "worker-a", (0..PARTITIONS).collect());
    partitioner.start().await.unwrap();

    // Joins without a running client, so it never heartbeats
    let silent = coordinator.backend("worker-b");
    {
        use zonectl_core::coordination::CoordinationBackend;
        silent.start().await.unwrap();
        silent.join_group(GROUP).await.unwrap();
    }
    live.run_watchers().await.unwrap();
    assert_eq!(partitioner.my_partitions().len(), (PARTITIONS / 2) as usize);

    tokio::time::sleep(Duration::from_secs(45)).await;
    live.run_watchers().await.unwrap();

    assert_eq!(coordinator.members(GROUP), BTreeSet::from(["worker-a".to_string()]));
    assert_eq!(partitioner.my_partitions().len(), PARTITIONS as usize);

    partitioner.stop().await;
    live.stop().await;
}

/// At most one member leads, and leadership moves on stand-down.
#[tokio::test]
async fn stress_leader_handover() {
    let coordinator = MemoryCoordinator::new();
    let mut members = Vec::new();
    for i in 0..6 {
        let client = Arc::new(CoordinationClient::with_backend(
            quiet_config(),
            Arc::new(coordinator.backend(format!("worker-{:02}", i))),
        ));
        client.start().await.unwrap();
        let election = LeaderElection::new(Some(client.clone()), GROUP);
        election.start().await.unwrap();
        members.push((client, election));
    }

    for round in 0..members.len() {
        for (client, _) in &members[round..] {
            client.run_watchers().await.unwrap();
        }
        let leaders: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, (_, election))| election.is_leader())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(leaders, vec![round], "exactly one leader per round");
        assert_eq!(
            coordinator.leader(GROUP),
            Some(format!("worker-{:02}", round))
        );

        let (client, election) = &members[round];
        election.stop().await.unwrap();
        assert!(!election.is_leader());
        assert_eq!(coordinator.leader(GROUP), None);
        client.stop().await;
    }
}

/// Many tasks updating one zone never interleave.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_zone_lock_contention() {
    let coordinator = MemoryCoordinator::new();
    let client = Arc::new(CoordinationClient::with_backend(
        quiet_config(),
        Arc::new(coordinator.backend("worker-a")),
    ));
    let zone_lock = ZoneLock::new(client);
    let resource = ResourceId::Zone(uuid::Uuid::new_v4());
    let serial = Arc::new(parking_lot::Mutex::new(0u64));

    let num_tasks = 64;
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..num_tasks {
        let zone_lock = zone_lock.clone();
        let serial = serial.clone();
        handles.push(tokio::spawn(async move {
            zone_lock
                .synchronized(resource, async {
                    let read = *serial.lock();
                    tokio::task::yield_now().await;
                    *serial.lock() = read + 1;
                    Ok::<_, ZoneCtlError>(())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(*serial.lock(), num_tasks);
    assert!(!coordinator.is_locked(&resource.lock_name()));

    println!("Zone lock contention stress test:");
    println!("  Tasks: {}", num_tasks);
    println!("  Elapsed: {:?}", start.elapsed());
}
