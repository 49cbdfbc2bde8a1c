//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Command pipeline produces:
//!     → events.rs (one CommandEvent per outcome, fanned out to sinks)
//!     → metrics.rs (counters, gauges, histograms)
//!     → logging.rs (structured log events, per-command spans)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Custom EventSink implementations
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every command runs in a span carrying its command ID
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - Sinks are injected into the Guard, never looked up globally

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{CommandEvent, EventKind, EventSink, MetricsSink};
