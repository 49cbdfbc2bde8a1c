//! Error taxonomy for the command pipeline and administrative operations.

use std::any::Any;
use serde::Serialize;
use thiserror::Error;

/// Boxed error returned by wrapped work and fallbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Discriminant of a [`GuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CircuitOpen,
    Timeout,
    ForceFallback,
    MaxConcurrency,
    Work,
    FallbackFailed,
    UnknownCircuit,
    Aborted,
}

/// Terminal failure of a command or an administrative call.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Admission denied by a tripped (or forced-open) breaker.
    #[error("circuit open")]
    CircuitOpen,

    /// The work did not finish within the configured timeout.
    #[error("timeout")]
    Timeout,

    /// Fallback forced by configuration.
    #[error("fallback forced")]
    ForceFallback,

    /// The executor pool had no free ticket.
    #[error("max concurrency")]
    MaxConcurrency,

    /// The wrapped work reported failure (or panicked).
    #[error("command failed: {0}")]
    Work(#[source] BoxError),

    /// The fallback itself failed while handling `cause`.
    #[error("fallback failed with '{source}'. run error was '{cause}'")]
    FallbackFailed {
        cause_kind: ErrorKind,
        cause: String,
        #[source]
        source: BoxError,
    },

    /// An administrative call referenced a circuit that was never created.
    #[error("unknown circuit '{0}'")]
    UnknownCircuit(String),

    /// The pipeline task ended without reporting, e.g. on runtime shutdown.
    #[error("command aborted before completion")]
    Aborted,
}

impl GuardError {
    pub fn work<E: Into<BoxError>>(err: E) -> Self {
        GuardError::Work(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::CircuitOpen => ErrorKind::CircuitOpen,
            GuardError::Timeout => ErrorKind::Timeout,
            GuardError::ForceFallback => ErrorKind::ForceFallback,
            GuardError::MaxConcurrency => ErrorKind::MaxConcurrency,
            GuardError::Work(_) => ErrorKind::Work,
            GuardError::FallbackFailed { .. } => ErrorKind::FallbackFailed,
            GuardError::UnknownCircuit(_) => ErrorKind::UnknownCircuit,
            GuardError::Aborted => ErrorKind::Aborted,
        }
    }
}

/// A panic caught inside wrapped work.
#[derive(Debug, Error)]
#[error("work panicked: {0}")]
pub struct PanicError(pub String);

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        PanicError(message)
    }
}
