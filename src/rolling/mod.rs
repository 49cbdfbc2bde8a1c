//! Rolling statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Command outcome observed
//!     → metrics.rs (per-outcome counters in the current bucket)
//!     → timing.rs (run duration sample in the current bucket)
//!
//! Circuit breaker evaluation:
//!     → metrics.rs aggregates buckets inside the window
//!     → volume + error percentage drive the trip decision
//! ```
//!
//! # Design Decisions
//! - One ring of fixed-width buckets per statistic (window.rs)
//! - Buckets rotate lazily on write; stale buckets are skipped on read
//! - Time is monotonic and never rewound
//! - A single mutex per window, no increment is ever lost

pub mod metrics;
pub mod timing;
pub mod window;

pub use metrics::{HealthCounts, Outcome, OutcomeCounts, RollingMetrics};
pub use timing::{LatencySnapshot, RollingTiming};
pub use window::RollingWindow;
