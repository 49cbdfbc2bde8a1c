//! Rolling outcome counters for one circuit.
//!
//! # Responsibilities
//! - Count command outcomes in the current time bucket
//! - Aggregate volume and error percentage over the rolling window
//! - Reset on circuit close and on flush
//!
//! # Numeric Semantics
//! ```text
//! volume        = success + failure + timeout + rejected
//! errors        = failure + timeout + rejected
//! error_percent = round(errors / volume * 100), 0 when volume == 0
//! ```
//! Short-circuits and fallback outcomes are counted for reporting only; they
//! never enter the volume or the error ratio.

use std::ops::AddAssign;
use std::time::Duration;
use serde::Serialize;

use crate::rolling::window::RollingWindow;

/// One observed command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// Turned away by a saturated executor pool.
    Rejected,
    /// Turned away by an open circuit.
    ShortCircuit,
    FallbackSuccess,
    FallbackFailure,
}

/// Aggregated counters for a span of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub short_circuits: u64,
    pub fallback_successes: u64,
    pub fallback_failures: u64,
}

impl OutcomeCounts {
    fn bump(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &mut self.successes,
            Outcome::Failure => &mut self.failures,
            Outcome::Timeout => &mut self.timeouts,
            Outcome::Rejected => &mut self.rejections,
            Outcome::ShortCircuit => &mut self.short_circuits,
            Outcome::FallbackSuccess => &mut self.fallback_successes,
            Outcome::FallbackFailure => &mut self.fallback_failures,
        };
        *counter += 1;
    }

    /// Calls that count toward the request volume.
    pub fn volume(&self) -> u64 {
        self.successes + self.errors()
    }

    /// Calls that count as errors.
    pub fn errors(&self) -> u64 {
        self.failures + self.timeouts + self.rejections
    }

    pub fn health(&self) -> HealthCounts {
        HealthCounts::new(self.volume(), self.errors())
    }
}

impl AddAssign<&OutcomeCounts> for OutcomeCounts {
    fn add_assign(&mut self, other: &OutcomeCounts) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.rejections += other.rejections;
        self.short_circuits += other.short_circuits;
        self.fallback_successes += other.fallback_successes;
        self.fallback_failures += other.fallback_failures;
    }
}

/// Volume and error view used by the trip decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub volume: u64,
    pub errors: u64,
    pub error_percent: u32,
}

impl HealthCounts {
    fn new(volume: u64, errors: u64) -> Self {
        let error_percent = if volume == 0 {
            0
        } else {
            (errors as f64 / volume as f64 * 100.0).round() as u32
        };
        Self {
            volume,
            errors,
            error_percent,
        }
    }
}

/// Time-windowed outcome counters.
#[derive(Debug)]
pub struct RollingMetrics {
    window: RollingWindow<OutcomeCounts>,
}

impl RollingMetrics {
    pub fn new(window: Duration, buckets: usize) -> Self {
        Self {
            window: RollingWindow::new(window, buckets),
        }
    }

    /// Count one outcome in the current bucket.
    pub fn record(&self, outcome: Outcome) {
        self.window.update(|counts| counts.bump(outcome));
    }

    /// Counters summed over the window.
    pub fn counts(&self) -> OutcomeCounts {
        self.window.fold(OutcomeCounts::default(), |mut acc, bucket| {
            acc += bucket;
            acc
        })
    }

    pub fn health(&self) -> HealthCounts {
        self.counts().health()
    }

    pub fn volume(&self) -> u64 {
        self.counts().volume()
    }

    pub fn error_percent(&self) -> u32 {
        self.health().error_percent
    }

    pub fn window(&self) -> Duration {
        self.window.window()
    }

    pub fn reset(&self) {
        self.window.reset();
    }
}
