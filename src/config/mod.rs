//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → settings.rs (resolved per-circuit Settings)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → settings registry upserts the new values
//!     → next command for each circuit observes them
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Numeric zero means "inherit", booleans are always explicit
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;
pub mod watcher;

pub use schema::{CommandConfig, GuardConfig, LogFormat, ObservabilityConfig};
pub use settings::{Settings, SettingsRegistry};
