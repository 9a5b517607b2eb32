//! Timing metrics for leader retrieval.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Legacy timer name, kept for dashboards that predate the namespaced
/// metric.
pub const LEGACY_RETRIEVAL_TIMER: &str = "current-leader-host-port";

/// Current timer name.
pub const RETRIEVAL_TIMER: &str = "debug.current-leader.retrieval.duration";

/// Accumulated statistics for one named timer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerStats {
    pub count: u64,
    pub total: Duration,
    pub last: Duration,
    pub max: Duration,
}

/// Registry of named timers shared with the surrounding scheduler's
/// metrics reporter.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    timers: Arc<RwLock<HashMap<String, TimerStats>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation under `name`.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut timers = self.timers.write();
        let stats = timers.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total += elapsed;
        stats.last = elapsed;
        stats.max = stats.max.max(elapsed);
    }

    /// Returns a snapshot of the named timer, if it has recorded
    /// anything.
    pub fn snapshot(&self, name: &str) -> Option<TimerStats> {
        self.timers.read().get(name).cloned()
    }
}

/// The pair of timers wrapped around every participant read.
///
/// Both names record the same observation so legacy and current
/// dashboards agree. Durations are measured around the awaited read, so
/// they include any queue wait when the election task is contended.
#[derive(Clone, Default)]
pub struct RetrievalTimers {
    registry: TimerRegistry,
}

impl RetrievalTimers {
    pub fn new(registry: TimerRegistry) -> Self {
        Self { registry }
    }

    /// Runs `fut` and records its wall-clock duration under both timer
    /// names.
    pub async fn time<T, Fut>(&self, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        let elapsed = started.elapsed();
        self.registry.record(LEGACY_RETRIEVAL_TIMER, elapsed);
        self.registry.record(RETRIEVAL_TIMER, elapsed);
        output
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_both_timers_record_each_read() {
        let timers = RetrievalTimers::default();

        let value = timers
            .time(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                7
            })
            .await;
        assert_eq!(value, 7);

        for name in [LEGACY_RETRIEVAL_TIMER, RETRIEVAL_TIMER] {
            let stats = timers.registry().snapshot(name).unwrap();
            assert_eq!(stats.count, 1);
            assert!(stats.last >= Duration::from_millis(5));
            assert_eq!(stats.max, stats.last);
        }
    }

    #[test]
    fn test_registry_accumulates() {
        let registry = TimerRegistry::new();
        registry.record("t", Duration::from_millis(10));
        registry.record("t", Duration::from_millis(30));

        let stats = registry.snapshot("t").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total, Duration::from_millis(40));
        assert_eq!(stats.last, Duration::from_millis(30));
        assert_eq!(stats.max, Duration::from_millis(30));

        assert!(registry.snapshot("missing").is_none());
    }
}
