//! Shared utilities for integration tests.

use std::sync::{Arc, Mutex};
use circuit_guard::{CommandConfig, CommandEvent, EventKind, EventSink, Guard, GuardError};

/// Sink that remembers every event it sees.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CommandEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    #[allow(dead_code)]
    pub fn events(&self) -> Vec<CommandEvent> {
        self.events.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &CommandEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A guard with one configured circuit and a recording sink.
pub fn guard_with(name: &str, config: CommandConfig) -> (Guard, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let guard = Guard::new().with_sinks(vec![sink.clone() as Arc<dyn EventSink>]);
    guard.configure_command(name, &config);
    (guard, sink)
}

/// Run one failing call.
#[allow(dead_code)]
pub async fn fail(guard: &Guard, name: &str) -> GuardError {
    guard
        .run(name, || async { Err::<(), _>("dependency failure") })
        .await
        .unwrap_err()
}

/// Run one succeeding call.
#[allow(dead_code)]
pub async fn succeed(guard: &Guard, name: &str) -> Result<(), GuardError> {
    guard.run(name, || async { Ok::<(), GuardError>(()) }).await
}
