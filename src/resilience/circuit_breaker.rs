//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: not stored; a one-caller permission to probe while open
//!
//! # State Transitions
//! ```text
//! Closed → Open: volume >= request_volume_threshold
//!                and error_percent >= error_percent_threshold
//! Open → probe:  first caller after sleep_window wins a CAS on the probe clock
//! probe → Closed: probe succeeds (rolling metrics reset)
//! probe → Open:   probe fails; next probe one sleep_window later
//! ```
//!
//! # Design Decisions
//! - One breaker per circuit name; breakers share no locks
//! - Trip evaluation is lazy: paid only while closed, on admission
//! - `open` is read lock-free, transitions are serialized by a mutex
//! - Probe admission never takes the mutex, only a compare-and-swap
//! - force_open > force_closed > trip logic

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::settings::SettingsRegistry;
use crate::observability::metrics;
use crate::resilience::pool::{ExecutorPool, PoolSnapshot};
use crate::rolling::{HealthCounts, LatencySnapshot, Outcome, OutcomeCounts, RollingMetrics, RollingTiming};

/// Serializable view of one circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub open: bool,
    pub force_open: bool,
    pub force_closed: bool,
    pub enabled: bool,
    pub health: HealthCounts,
    pub counts: OutcomeCounts,
    pub pool: PoolSnapshot,
    pub latency: LatencySnapshot,
}

/// Trip/recovery state machine for one circuit name.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Arc<str>,
    settings: SettingsRegistry,
    epoch: Instant,

    open: AtomicBool,
    transition: Mutex<()>,
    /// Nanoseconds since `epoch` of the last trip or granted probe.
    opened_or_last_tested: AtomicU64,

    force_open: AtomicBool,
    force_closed: bool,

    metrics: RollingMetrics,
    timing: RollingTiming,
    pool: Arc<ExecutorPool>,
}

impl CircuitBreaker {
    /// Create a breaker, resolving force flags, pool capacity and window
    /// geometry from `settings` once.
    pub fn new(name: &str, settings: SettingsRegistry) -> Self {
        let s = settings.get_settings(name);
        let pool = ExecutorPool::new(name, s.max_concurrent_requests, s.rolling_window, s.rolling_buckets);

        tracing::debug!(
            circuit = %name,
            capacity = pool.capacity(),
            force_open = s.force_open,
            force_close = s.force_close,
            "Circuit created"
        );

        Self {
            name: Arc::from(name),
            epoch: Instant::now(),
            open: AtomicBool::new(false),
            transition: Mutex::new(()),
            opened_or_last_tested: AtomicU64::new(0),
            force_open: AtomicBool::new(s.force_open),
            force_closed: s.force_close,
            metrics: RollingMetrics::new(s.rolling_window, s.rolling_buckets),
            timing: RollingTiming::new(s.rolling_window, s.rolling_buckets),
            pool: Arc::new(pool),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &RollingMetrics {
        &self.metrics
    }

    pub fn timing(&self) -> &RollingTiming {
        &self.timing
    }

    pub fn is_force_open(&self) -> bool {
        self.force_open.load(Ordering::Acquire)
    }

    pub fn is_force_closed(&self) -> bool {
        self.force_closed
    }

    /// Breaker enablement as currently configured.
    pub fn is_enabled(&self) -> bool {
        self.settings.get_settings(&self.name).circuit_breaker_enabled
    }

    /// Administrative override; takes effect on the next admission check.
    pub fn set_force_open(&self, force_open: bool) {
        self.force_open.store(force_open, Ordering::Release);
        tracing::info!(circuit = %self.name, force_open, "Circuit force-open toggled");
    }

    /// May a new call proceed?
    pub fn allow_request(&self) -> bool {
        if self.is_force_open() {
            return false;
        }
        if self.force_closed {
            return true;
        }
        !self.is_open() || self.allow_single_test()
    }

    /// Whether the circuit is tripped, re-evaluating the window while closed.
    pub fn is_open(&self) -> bool {
        if self.is_force_open() || self.open.load(Ordering::Acquire) {
            return true;
        }

        let settings = self.settings.get_settings(&self.name);
        let health = self.metrics.health();
        if health.volume < settings.request_volume_threshold {
            return false;
        }
        if health.error_percent >= settings.error_percent_threshold {
            return self.trip();
        }
        false
    }

    /// One winner per sleep window while open.
    fn allow_single_test(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }

        let sleep_window = self.settings.get_settings(&self.name).sleep_window;
        let now = self.now_nanos();
        let last = self.opened_or_last_tested.load(Ordering::Acquire);
        if now <= last.saturating_add(sleep_window.as_nanos() as u64) {
            return false;
        }

        let won = self
            .opened_or_last_tested
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            tracing::info!(circuit = %self.name, "Allowing single test to possibly close circuit");
        }
        won
    }

    /// Trip the circuit. No-op if already open.
    pub fn set_open(&self) {
        let _guard = self.lock_transition();
        if !self.open.load(Ordering::Acquire) {
            self.mark_open(None);
        }
    }

    /// Trip if the window still warrants it once the transition lock is held;
    /// a concurrent close may have reset the history in between.
    fn trip(&self) -> bool {
        let _guard = self.lock_transition();
        if self.open.load(Ordering::Acquire) {
            return true;
        }

        let settings = self.settings.get_settings(&self.name);
        let health = self.metrics.health();
        if health.volume < settings.request_volume_threshold
            || health.error_percent < settings.error_percent_threshold
        {
            return false;
        }
        self.mark_open(Some(&health));
        true
    }

    fn mark_open(&self, health: Option<&HealthCounts>) {
        self.opened_or_last_tested
            .store(self.now_nanos(), Ordering::Release);
        self.open.store(true, Ordering::Release);

        let (volume, error_percent) = health.map_or((0, 0), |h| (h.volume, h.error_percent));
        tracing::warn!(
            event = "circuit_transition",
            circuit = %self.name,
            from = "closed",
            to = "open",
            volume,
            error_percent,
            "Circuit opened"
        );
        metrics::record_circuit_open(&self.name, true);
    }

    /// Close the circuit and start a clean health history. No-op if closed.
    pub fn set_close(&self) {
        let _guard = self.lock_transition();
        if !self.open.load(Ordering::Acquire) {
            return;
        }

        // History is cleared before readers can observe the closed state.
        self.metrics.reset();
        self.open.store(false, Ordering::Release);

        tracing::info!(
            event = "circuit_transition",
            circuit = %self.name,
            from = "open",
            to = "closed",
            "Circuit closed"
        );
        metrics::record_circuit_open(&self.name, false);
    }

    /// Record an outcome; a success while open closes the circuit.
    pub fn report(&self, outcome: Outcome) {
        self.metrics.record(outcome);
        if outcome == Outcome::Success && self.open.load(Ordering::Acquire) {
            self.set_close();
        }
    }

    /// Drop all rolling history (breaker, latency and pool).
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.timing.reset();
        self.pool.metrics().reset();
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let counts = self.metrics.counts();
        CircuitSnapshot {
            name: self.name.to_string(),
            open: self.is_force_open() || self.open.load(Ordering::Acquire),
            force_open: self.is_force_open(),
            force_closed: self.force_closed,
            enabled: self.is_enabled(),
            health: counts.health(),
            counts,
            pool: self.pool.snapshot(),
            latency: self.timing.snapshot(),
        }
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_nanos(&self) -> u64 {
        Instant::now().saturating_duration_since(self.epoch).as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::config::CommandConfig;

    fn breaker(config: CommandConfig) -> CircuitBreaker {
        let settings = SettingsRegistry::new();
        settings.configure_command("dep", &config);
        CircuitBreaker::new("dep", settings)
    }

    fn trip_config() -> CommandConfig {
        CommandConfig {
            request_volume_threshold: 3,
            error_percent_threshold: 50,
            sleep_window_ms: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_below_volume_never_trips() {
        let cb = breaker(trip_config());
        cb.report(Outcome::Failure);
        cb.report(Outcome::Failure);
        assert!(!cb.is_open());
        assert!(cb.allow_request());
    }

    #[test]
    fn test_trips_on_volume_and_error_rate() {
        let cb = breaker(trip_config());
        cb.report(Outcome::Failure);
        cb.report(Outcome::Failure);
        cb.report(Outcome::Success);

        assert!(cb.is_open());
        assert!(!cb.allow_request());
        assert!(cb.snapshot().open);
    }

    #[test]
    fn test_healthy_window_stays_closed() {
        let cb = breaker(trip_config());
        cb.report(Outcome::Failure);
        cb.report(Outcome::Success);
        cb.report(Outcome::Success);
        // 33% < 50%
        assert!(!cb.is_open());
    }

    #[test]
    fn test_force_open_wins() {
        let cb = breaker(CommandConfig {
            force_open: true,
            force_close: true,
            ..Default::default()
        });
        assert!(!cb.allow_request());
        assert!(cb.is_open());
    }

    #[test]
    fn test_force_closed_ignores_health() {
        let cb = breaker(CommandConfig {
            force_close: true,
            ..trip_config()
        });
        for _ in 0..10 {
            cb.report(Outcome::Failure);
        }
        assert!(cb.allow_request());
    }

    #[test]
    fn test_toggle_force_open() {
        let cb = breaker(CommandConfig::default());
        assert!(cb.allow_request());
        cb.set_force_open(true);
        assert!(!cb.allow_request());
        cb.set_force_open(false);
        assert!(cb.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_probe_per_sleep_window() {
        let cb = breaker(trip_config());
        cb.set_open();
        assert!(!cb.allow_request());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(cb.allow_request(), "first caller after the window probes");
        assert!(!cb.allow_request(), "second caller is denied");

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!cb.allow_request());

        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(cb.allow_request(), "next window grants one more probe");
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_probe_success_closes_and_resets() {
        let cb = breaker(trip_config());
        cb.report(Outcome::Failure);
        cb.report(Outcome::Failure);
        cb.report(Outcome::Failure);
        assert!(cb.is_open());

        cb.report(Outcome::Success);
        assert!(!cb.is_open());
        let counts = cb.metrics().counts();
        assert_eq!(counts.failures, 0, "pre-close history is discarded");
        assert_eq!(counts.successes, 0);
    }

    #[test]
    fn test_set_open_is_idempotent() {
        let cb = breaker(trip_config());
        cb.set_open();
        let stamp = cb.opened_or_last_tested.load(Ordering::Acquire);
        std::thread::sleep(Duration::from_millis(2));
        cb.set_open();
        assert_eq!(cb.opened_or_last_tested.load(Ordering::Acquire), stamp);
    }

    #[test]
    fn test_close_is_not_undone_by_stale_history() {
        for _ in 0..200 {
            let cb = Arc::new(breaker(trip_config()));
            for _ in 0..3 {
                cb.report(Outcome::Failure);
            }
            assert!(cb.is_open());

            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let cb = cb.clone();
                    std::thread::spawn(move || {
                        for _ in 0..200 {
                            cb.is_open();
                        }
                    })
                })
                .collect();
            cb.report(Outcome::Success);
            for r in readers {
                r.join().unwrap();
            }

            assert!(!cb.is_open(), "closed circuit re-tripped on discarded history");
        }
    }

    #[test]
    fn test_enabled_follows_settings() {
        let settings = SettingsRegistry::new();
        let cb = CircuitBreaker::new("dep", settings.clone());
        assert!(cb.snapshot().enabled);

        settings.configure_command(
            "dep",
            &CommandConfig {
                circuit_breaker_enabled: false,
                ..Default::default()
            },
        );
        assert!(!cb.is_enabled());
        assert!(!cb.snapshot().enabled);
    }

    #[test]
    fn test_pool_capacity_resolved_at_creation() {
        let cb = breaker(CommandConfig {
            max_concurrent_requests: 3,
            ..Default::default()
        });
        assert_eq!(cb.pool().capacity(), 3);
    }
}
