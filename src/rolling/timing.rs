//! Rolling run-duration samples.
//!
//! Reporting only: latency never feeds the trip decision.

use std::time::Duration;
use serde::Serialize;

use crate::rolling::window::RollingWindow;

/// Samples kept per bucket; later samples in a saturated bucket are dropped.
const MAX_SAMPLES_PER_BUCKET: usize = 1024;

#[derive(Debug, Default)]
struct TimingBucket {
    samples: Vec<Duration>,
    observed: u64,
}

/// Latency summary over the rolling window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Time-windowed duration samples.
#[derive(Debug)]
pub struct RollingTiming {
    window: RollingWindow<TimingBucket>,
}

impl RollingTiming {
    pub fn new(window: Duration, buckets: usize) -> Self {
        Self {
            window: RollingWindow::new(window, buckets),
        }
    }

    pub fn record(&self, duration: Duration) {
        self.window.update(|bucket| {
            bucket.observed += 1;
            if bucket.samples.len() < MAX_SAMPLES_PER_BUCKET {
                bucket.samples.push(duration);
            }
        });
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let (mut samples, count) = self.window.fold((Vec::new(), 0u64), |(mut acc, n), bucket| {
            acc.extend_from_slice(&bucket.samples);
            (acc, n + bucket.observed)
        });

        if samples.is_empty() {
            return LatencySnapshot::default();
        }
        samples.sort_unstable();

        let total: Duration = samples.iter().sum();
        let mean = total / samples.len() as u32;
        let max = samples[samples.len() - 1];

        LatencySnapshot {
            count,
            mean_ms: as_ms(mean),
            p50_ms: as_ms(percentile(&samples, 50.0)),
            p90_ms: as_ms(percentile(&samples, 90.0)),
            p99_ms: as_ms(percentile(&samples, 99.0)),
            max_ms: as_ms(max),
        }
    }

    pub fn reset(&self) {
        self.window.reset();
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = (p * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}
