//! Command events and pluggable event sinks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

use crate::observability::metrics;

/// What happened to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Success,
    Failure,
    Timeout,
    Rejected,
    ShortCircuit,
    ForceFallback,
    FallbackSuccess,
    FallbackFailure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Timeout => "timeout",
            EventKind::Rejected => "rejected",
            EventKind::ShortCircuit => "short-circuit",
            EventKind::ForceFallback => "force-fallback",
            EventKind::FallbackSuccess => "fallback-success",
            EventKind::FallbackFailure => "fallback-failure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed command event.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEvent {
    pub circuit: Arc<str>,
    pub kind: EventKind,
    /// Time since the command started.
    pub elapsed: Duration,
    /// Time spent inside the wrapped work, when it ran to completion.
    pub run_duration: Option<Duration>,
}

/// Receiver of command events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &CommandEvent);
}

/// Default sink publishing through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl EventSink for MetricsSink {
    fn record(&self, event: &CommandEvent) {
        metrics::record_command_event(&event.circuit, event.kind.as_str(), event.elapsed);
        if let Some(run) = event.run_duration {
            metrics::record_run_duration(&event.circuit, run);
        }
    }
}
