//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call on circuit `name`:
//!     → circuit_breaker.rs (admission: force flags, trip state, probe)
//!     → pool.rs (take a ticket or fail fast)
//!     → command.rs (run under deadline, classify, fallback, report)
//!     → rolling statistics updated, breaker may close
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline unless timeouts are disabled
//! - Admission control never blocks
//! - Circuit breaker prevents cascading failures
//! - Errors are values; panics never escape a command

pub mod circuit_breaker;
pub mod command;
pub mod error;
pub mod pool;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot};
pub use command::{Command, CommandHandle};
pub use error::{BoxError, ErrorKind, GuardError};
pub use pool::{ExecutorPool, Ticket, MAX_CONCURRENT_CEILING};
