//! Command execution pipeline.
//!
//! # Data Flow
//! ```text
//! go(name, work, fallback)
//!     → force_fallback?             → fallback(ForceFallback)
//!     → breaker.allow_request()?    → fallback(CircuitOpen)      [short-circuit]
//!     → pool.acquire()?             → fallback(MaxConcurrency)   [rejected]
//!     → spawn work (holds ticket)
//!     → wait: work vs. timeout
//!         work Ok        → success, close circuit if open
//!         work Err/panic → fallback(Work)                        [failure]
//!         deadline       → fallback(Timeout)                     [timeout]
//! ```
//!
//! # Design Decisions
//! - The ticket lives inside the work task, so it is returned when the work
//!   really finishes, including after a timeout or a panic
//! - A timeout stops waiting, it does not stop the work
//! - Panics in work or fallback become error values, never crashes
//! - Fallback outcomes are reported but never enter the error ratio

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::observability::events::{CommandEvent, EventKind, EventSink};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error::{BoxError, GuardError, PanicError};
use crate::rolling::Outcome;

/// Boxed fallback: receives the triggering error, may produce a substitute value.
pub type Fallback<T> = Box<dyn FnOnce(GuardError) -> BoxFuture<'static, Result<T, BoxError>> + Send>;

/// Box a fallback closure.
pub fn boxed_fallback<T, F, Fut, E>(fallback: F) -> Fallback<T>
where
    T: Send + 'static,
    F: FnOnce(GuardError) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move |err| async move { fallback(err).await.map_err(Into::into) }.boxed())
}

/// Shared list of event sinks.
pub type Sinks = Arc<[Arc<dyn EventSink>]>;

/// One invocation against a circuit.
pub struct Command<T> {
    id: Uuid,
    circuit: Arc<CircuitBreaker>,
    settings: Arc<Settings>,
    sinks: Sinks,
    fallback: Option<Fallback<T>>,
    started: Instant,
    run_duration: Option<Duration>,
}

impl<T: Send + 'static> Command<T> {
    pub fn new(
        circuit: Arc<CircuitBreaker>,
        settings: Arc<Settings>,
        sinks: Sinks,
        fallback: Option<Fallback<T>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            circuit,
            settings,
            sinks,
            fallback,
            started: Instant::now(),
            run_duration: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the pipeline on its own task and return a handle to the result.
    pub fn spawn<W, Fut, E>(self, work: W) -> CommandHandle<T>
    where
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.id;
        let span = tracing::debug_span!("command", circuit = %self.circuit.name(), id = %id);

        tokio::spawn(
            async move {
                let result = self.execute(work).await;
                let _ = tx.send(result);
            }
            .instrument(span),
        );

        CommandHandle { id, rx }
    }

    /// Drive the pipeline to completion.
    pub async fn execute<W, Fut, E>(mut self, work: W) -> Result<T, GuardError>
    where
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        if self.settings.force_fallback {
            self.emit(EventKind::ForceFallback);
            return self.try_fallback(GuardError::ForceFallback).await;
        }

        if self.settings.circuit_breaker_enabled && !self.circuit.allow_request() {
            self.circuit.report(Outcome::ShortCircuit);
            self.emit(EventKind::ShortCircuit);
            return self.try_fallback(GuardError::CircuitOpen).await;
        }

        let ticket = match self.circuit.pool().acquire() {
            Ok(ticket) => ticket,
            Err(err) => {
                self.circuit.report(Outcome::Rejected);
                self.emit(EventKind::Rejected);
                return self.try_fallback(err).await;
            }
        };

        let run_started = Instant::now();
        let mut task = tokio::spawn(
            async move {
                let _ticket = ticket;
                AssertUnwindSafe(async move { work().await.map_err(Into::<BoxError>::into) })
                    .catch_unwind()
                    .await
            }
            .in_current_span(),
        );

        let joined = if self.settings.timeout_enabled {
            match tokio::time::timeout(self.settings.timeout, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::debug!(
                        timeout_ms = self.settings.timeout.as_millis() as u64,
                        "Command timed out; work left running detached"
                    );
                    self.circuit.report(Outcome::Timeout);
                    self.emit(EventKind::Timeout);
                    return self.try_fallback(GuardError::Timeout).await;
                }
            }
        } else {
            (&mut task).await
        };

        let run_duration = run_started.elapsed();
        self.run_duration = Some(run_duration);
        self.circuit.timing().record(run_duration);

        let err = match joined {
            Ok(Ok(Ok(value))) => {
                self.circuit.report(Outcome::Success);
                self.emit(EventKind::Success);
                return Ok(value);
            }
            Ok(Ok(Err(e))) => GuardError::Work(e),
            Ok(Err(payload)) => GuardError::work(PanicError::from_payload(payload)),
            Err(join_err) => GuardError::work(join_err),
        };

        tracing::debug!(error = %err, "Command failed");
        self.circuit.report(Outcome::Failure);
        self.emit(EventKind::Failure);
        self.try_fallback(err).await
    }

    async fn try_fallback(&mut self, err: GuardError) -> Result<T, GuardError> {
        let Some(fallback) = self.fallback.take() else {
            return Err(err);
        };

        let cause_kind = err.kind();
        let cause = err.to_string();
        let outcome = AssertUnwindSafe(async move { fallback(err).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Box::new(PanicError::from_payload(payload)) as BoxError));

        match outcome {
            Ok(value) => {
                self.circuit.report(Outcome::FallbackSuccess);
                self.emit(EventKind::FallbackSuccess);
                Ok(value)
            }
            Err(source) => {
                tracing::debug!(cause = %cause, error = %source, "Fallback failed");
                self.circuit.report(Outcome::FallbackFailure);
                self.emit(EventKind::FallbackFailure);
                Err(GuardError::FallbackFailed {
                    cause_kind,
                    cause,
                    source,
                })
            }
        }
    }

    fn emit(&self, kind: EventKind) {
        let event = CommandEvent {
            circuit: self.circuit.shared_name(),
            kind,
            elapsed: self.started.elapsed(),
            run_duration: self.run_duration,
        };
        tracing::debug!(
            event = %kind,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "Command event"
        );
        for sink in self.sinks.iter() {
            sink.record(&event);
        }
    }
}

/// Completion handle for a spawned command.
#[derive(Debug)]
pub struct CommandHandle<T> {
    id: Uuid,
    rx: oneshot::Receiver<Result<T, GuardError>>,
}

impl<T> CommandHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for CommandHandle<T> {
    type Output = Result<T, GuardError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(GuardError::Aborted)))
    }
}
