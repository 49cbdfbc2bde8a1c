//! Resolved per-circuit settings and the settings registry.
//!
//! # Responsibilities
//! - Resolve `CommandConfig` overrides into complete `Settings`
//! - Store settings by circuit name, with global defaults as the fallback
//! - Answer lookups for unknown names without failing
//!
//! # Resolution
//! ```text
//! numeric field: explicit non-zero → previously configured → global default
//! boolean field: applied as given
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::{CommandConfig, GuardConfig};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_REQUEST_VOLUME_THRESHOLD: u64 = 20;
pub const DEFAULT_SLEEP_WINDOW: Duration = Duration::from_millis(5000);
pub const DEFAULT_ERROR_PERCENT_THRESHOLD: u32 = 50;
pub const DEFAULT_ROLLING_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_ROLLING_BUCKETS: usize = 10;

/// Complete, resolved tunables for one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub timeout: Duration,
    pub timeout_enabled: bool,
    pub max_concurrent_requests: usize,
    pub circuit_breaker_enabled: bool,
    pub request_volume_threshold: u64,
    pub sleep_window: Duration,
    pub error_percent_threshold: u32,
    pub rolling_window: Duration,
    pub rolling_buckets: usize,
    pub force_fallback: bool,
    pub force_open: bool,
    pub force_close: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            timeout_enabled: true,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            circuit_breaker_enabled: true,
            request_volume_threshold: DEFAULT_REQUEST_VOLUME_THRESHOLD,
            sleep_window: DEFAULT_SLEEP_WINDOW,
            error_percent_threshold: DEFAULT_ERROR_PERCENT_THRESHOLD,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            rolling_buckets: DEFAULT_ROLLING_BUCKETS,
            force_fallback: false,
            force_open: false,
            force_close: false,
        }
    }
}

impl Settings {
    /// Apply `config` on top of `base`.
    pub fn overlay(base: &Settings, config: &CommandConfig) -> Settings {
        Settings {
            timeout: pick_ms(config.timeout_ms, base.timeout),
            timeout_enabled: config.timeout_enabled,
            max_concurrent_requests: pick(config.max_concurrent_requests, base.max_concurrent_requests),
            circuit_breaker_enabled: config.circuit_breaker_enabled,
            request_volume_threshold: pick(config.request_volume_threshold, base.request_volume_threshold),
            sleep_window: pick_ms(config.sleep_window_ms, base.sleep_window),
            error_percent_threshold: pick(config.error_percent_threshold, base.error_percent_threshold),
            rolling_window: pick_ms(config.rolling_window_ms, base.rolling_window),
            rolling_buckets: pick(config.rolling_buckets, base.rolling_buckets),
            force_fallback: config.force_fallback,
            force_open: config.force_open,
            force_close: config.force_close,
        }
    }
}

fn pick<T: Default + PartialEq>(value: T, base: T) -> T {
    if value == T::default() { base } else { value }
}

fn pick_ms(value: u64, base: Duration) -> Duration {
    if value == 0 { base } else { Duration::from_millis(value) }
}

/// Name → settings directory.
///
/// Cheap to clone; clones share the same underlying tables.
#[derive(Debug, Clone)]
pub struct SettingsRegistry {
    defaults: Arc<ArcSwap<Settings>>,
    commands: Arc<DashMap<String, Arc<Settings>>>,
}

impl SettingsRegistry {
    /// Registry with the built-in defaults and no per-circuit entries.
    pub fn new() -> Self {
        Self::with_defaults(Settings::default())
    }

    pub fn with_defaults(defaults: Settings) -> Self {
        Self {
            defaults: Arc::new(ArcSwap::from_pointee(defaults)),
            commands: Arc::new(DashMap::new()),
        }
    }

    /// Build a registry from a loaded configuration file.
    pub fn from_config(config: &GuardConfig) -> Self {
        let registry = Self::with_defaults(Settings::overlay(&Settings::default(), &config.defaults));
        registry.configure(config.circuits.clone());
        registry
    }

    /// Replace the global defaults with `config` applied over the built-ins.
    ///
    /// Circuits configured earlier keep the values they resolved at the time.
    pub fn set_defaults(&self, config: &CommandConfig) {
        self.defaults
            .store(Arc::new(Settings::overlay(&Settings::default(), config)));
    }

    pub fn defaults(&self) -> Arc<Settings> {
        self.defaults.load_full()
    }

    /// Upsert many circuits at once.
    pub fn configure(&self, configs: HashMap<String, CommandConfig>) {
        for (name, config) in configs {
            self.configure_command(&name, &config);
        }
    }

    /// Upsert one circuit.
    pub fn configure_command(&self, name: &str, config: &CommandConfig) {
        let base = self
            .commands
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.defaults());
        let resolved = Settings::overlay(&base, config);

        tracing::debug!(
            circuit = %name,
            timeout_ms = resolved.timeout.as_millis() as u64,
            max_concurrent_requests = resolved.max_concurrent_requests,
            error_percent_threshold = resolved.error_percent_threshold,
            "Circuit settings configured"
        );
        self.commands.insert(name.to_string(), Arc::new(resolved));
    }

    /// Settings for `name`; unknown names resolve to the global defaults.
    pub fn get_settings(&self, name: &str) -> Arc<Settings> {
        self.commands
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.defaults())
    }

    /// Whether `name` has been configured explicitly.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Names of explicitly configured circuits.
    pub fn names(&self) -> Vec<String> {
        self.commands.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for SettingsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
