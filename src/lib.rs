//! Per-dependency fault isolation and admission control.
//!
//! Wrap calls to an unreliable dependency in a named circuit: the guard
//! limits concurrency, enforces a deadline, trips the circuit when the
//! rolling error rate is too high, and substitutes a fallback on failure.
//!
//! ```no_run
//! # async fn demo() {
//! use circuit_guard::{Guard, GuardError};
//!
//! let guard = Guard::new();
//! let price = guard
//!     .run_with_fallback(
//!         "pricing",
//!         || async { Ok::<u64, GuardError>(42) },
//!         |_err| async { Ok::<u64, GuardError>(0) },
//!     )
//!     .await;
//! # let _ = price;
//! # }
//! ```

pub mod config;
pub mod guard;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod rolling;

pub use config::{CommandConfig, GuardConfig, Settings, SettingsRegistry};
pub use guard::Guard;
pub use observability::{CommandEvent, EventKind, EventSink};
pub use registry::CircuitRegistry;
pub use resilience::{BoxError, CircuitBreaker, CircuitSnapshot, CommandHandle, ErrorKind, GuardError};
