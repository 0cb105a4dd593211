//! Prometheus metrics for monitoring
//!
//! Counters, gauges and histograms for coordination, locking and
//! scheduling, rendered in the Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Upper bounds, in seconds, of the lock-wait histogram buckets
const LOCK_WAIT_BOUNDS: [f64; 9] = [0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0];

/// Name and help text shared by every metric kind
struct Desc {
    name: &'static str,
    help: &'static str,
}

impl Desc {
    fn header(&self, kind: &str) -> String {
        format!("# HELP {0} {1}\n# TYPE {0} {2}\n", self.name, self.help, kind)
    }
}

/// Event tally, only ever goes up
pub struct Counter {
    desc: Desc,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            desc: Desc { name, help },
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = self.desc.header("counter");
        let _ = writeln!(out, "{} {}", self.desc.name, self.get());
        out
    }
}

/// Last-written value, e.g. partitions owned right now
pub struct Gauge {
    desc: Desc,
    value: AtomicI64,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            desc: Desc { name, help },
            value: AtomicI64::new(0),
        }
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = self.desc.header("gauge");
        let _ = writeln!(out, "{} {}", self.desc.name, self.get());
        out
    }
}

/// Lock-wait durations, bucketed from a millisecond up to a minute.
///
/// Buckets are cumulative; anything above the last bound only shows in
/// the `+Inf` bucket.
pub struct Histogram {
    desc: Desc,
    buckets: [AtomicU64; LOCK_WAIT_BOUNDS.len()],
    sum_micros: AtomicU64,
    observed: AtomicU64,
}

impl Histogram {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            desc: Desc { name, help },
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_micros: AtomicU64::new(0),
            observed: AtomicU64::new(0),
        }
    }

    /// Record one wait of `seconds`
    pub fn observe(&self, seconds: f64) {
        self.observed.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        for (bound, bucket) in LOCK_WAIT_BOUNDS.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        let name = self.desc.name;
        let mut out = self.desc.header("histogram");
        for (bound, bucket) in LOCK_WAIT_BOUNDS.iter().zip(&self.buckets) {
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{}\"}} {}",
                name,
                bound,
                bucket.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, self.count());
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_sum {}", name, sum);
        let _ = writeln!(out, "{}_count {}", name, self.count());
        out
    }
}

/// Standard zonectl metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static COORDINATION_CONNECT_ATTEMPTS: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "zonectl_coordination_connect_attempts_total",
            "Connection attempts to the coordination backend",
        )
    });

    pub static HEARTBEAT_FAILURES: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("zonectl_heartbeat_failures_total", "Failed coordination heartbeats")
    });

    pub static OWNED_PARTITIONS: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("zonectl_owned_partitions", "Partitions owned by this member")
    });

    pub static GROUP_MEMBERS: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("zonectl_group_members", "Members observed in the service group")
    });

    pub static IS_LEADER: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("zonectl_is_leader", "1 if this member leads its group")
    });

    pub static ZONE_LOCKS_ACQUIRED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("zonectl_zone_locks_acquired_total", "Zone locks acquired from the backend")
    });

    pub static REENTRANT_LOCK_HITS: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "zonectl_reentrant_lock_hits_total",
            "Synchronized calls that re-entered a lock already held by the task",
        )
    });

    pub static LOCK_WAIT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("zonectl_lock_wait_duration_seconds", "Time spent waiting for zone locks")
    });

    pub static SCHEDULER_DECISIONS: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("zonectl_scheduler_decisions_total", "Zones scheduled onto a pool")
    });
}

/// Render every standard metric
pub fn gather_metrics() -> String {
    let mut output = String::new();

    // Counters
    output.push_str(&standard::COORDINATION_CONNECT_ATTEMPTS.to_prometheus());
    output.push_str(&standard::HEARTBEAT_FAILURES.to_prometheus());
    output.push_str(&standard::ZONE_LOCKS_ACQUIRED.to_prometheus());
    output.push_str(&standard::REENTRANT_LOCK_HITS.to_prometheus());
    output.push_str(&standard::SCHEDULER_DECISIONS.to_prometheus());

    // Gauges
    output.push_str(&standard::OWNED_PARTITIONS.to_prometheus());
    output.push_str(&standard::GROUP_MEMBERS.to_prometheus());
    output.push_str(&standard::IS_LEADER.to_prometheus());

    // Histograms
    output.push_str(&standard::LOCK_WAIT_DURATION.to_prometheus());

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge", "Test gauge");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
        gauge.set(-1);
        assert_eq!(gauge.get(), -1);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("test_histogram", "Test histogram");

        histogram.observe(0.001);
        histogram.observe(0.5);
        histogram.observe(120.0);

        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 3"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"0.001\"} 1"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"+Inf\"} 3"));
    }

    #[test]
    fn test_gather_metrics() {
        let output = gather_metrics();
        assert!(output.contains("zonectl_owned_partitions"));
        assert!(output.contains("zonectl_lock_wait_duration_seconds_count"));
    }
}
