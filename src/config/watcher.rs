//! Configuration file watcher for hot reload.
//!
//! Each reload is diffed against the last accepted configuration; only the
//! changed parts travel to the guard.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{CommandConfig, GuardConfig};
use crate::guard::Guard;

/// What changed between two accepted configurations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDelta {
    /// New global defaults, when they changed.
    pub defaults: Option<CommandConfig>,
    /// Circuits that were added or whose overrides changed.
    pub circuits: HashMap<String, CommandConfig>,
}

impl ConfigDelta {
    pub fn between(old: &GuardConfig, new: &GuardConfig) -> Self {
        let defaults = (old.defaults != new.defaults).then(|| new.defaults.clone());
        let circuits = new
            .circuits
            .iter()
            .filter(|(name, config)| old.circuits.get(*name) != Some(*config))
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();
        Self { defaults, circuits }
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_none() && self.circuits.is_empty()
    }
}

/// Watches the configuration file and emits a [`ConfigDelta`] per effective change.
pub struct ConfigWatcher {
    path: PathBuf,
    current: GuardConfig,
    update_tx: mpsc::UnboundedSender<ConfigDelta>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, diffing future reloads against `current`.
    pub fn new(path: &Path, current: GuardConfig) -> (Self, mpsc::UnboundedReceiver<ConfigDelta>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let mut current = self.current;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(new_config) => {
                            let delta = ConfigDelta::between(&current, &new_config);
                            current = new_config;
                            if delta.is_empty() {
                                tracing::debug!("Config file touched, no circuit settings changed");
                                return;
                            }
                            tracing::info!(
                                defaults_changed = delta.defaults.is_some(),
                                circuits = delta.circuits.len(),
                                "Config change detected"
                            );
                            let _ = tx.send(delta);
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config, keeping current configuration"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply every configuration delta to `guard` until the channel closes.
///
/// Only settings change: breakers that already exist keep the force flags and
/// pool capacity they resolved at creation.
pub async fn apply_updates(guard: Guard, mut updates: mpsc::UnboundedReceiver<ConfigDelta>) {
    while let Some(delta) = updates.recv().await {
        if let Some(defaults) = &delta.defaults {
            guard.settings().set_defaults(defaults);
        }
        let count = delta.circuits.len();
        guard.configure(delta.circuits);
        tracing::info!(circuits = count, "Configuration reloaded");
    }
}
