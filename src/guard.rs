//! The `Guard`: entry point owning settings, circuits and event sinks.
//!
//! A `Guard` is an explicitly owned registry object. Clones share state, so
//! one guard can be handed to every caller that protects the same set of
//! dependencies, while tests build their own isolated instance.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::schema::{CommandConfig, GuardConfig};
use crate::config::settings::SettingsRegistry;
use crate::observability::events::{EventSink, MetricsSink};
use crate::registry::CircuitRegistry;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot};
use crate::resilience::command::{boxed_fallback, Command, CommandHandle, Fallback, Sinks};
use crate::resilience::error::{BoxError, GuardError};

#[derive(Clone)]
pub struct Guard {
    settings: SettingsRegistry,
    circuits: Arc<CircuitRegistry>,
    sinks: Sinks,
}

impl Guard {
    /// Guard with built-in defaults publishing to the `metrics` facade.
    pub fn new() -> Self {
        Self::with_settings(SettingsRegistry::new())
    }

    pub fn with_settings(settings: SettingsRegistry) -> Self {
        Self {
            circuits: Arc::new(CircuitRegistry::new(settings.clone())),
            settings,
            sinks: Arc::from(vec![Arc::new(MetricsSink) as Arc<dyn EventSink>]),
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::with_settings(SettingsRegistry::from_config(config))
    }

    /// Add an event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        let mut sinks: Vec<Arc<dyn EventSink>> = self.sinks.iter().cloned().collect();
        sinks.push(sink);
        self.sinks = Arc::from(sinks);
        self
    }

    /// Replace all event sinks.
    pub fn with_sinks(mut self, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        self.sinks = Arc::from(sinks);
        self
    }

    pub fn settings(&self) -> &SettingsRegistry {
        &self.settings
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    pub fn configure(&self, configs: HashMap<String, CommandConfig>) {
        self.settings.configure(configs);
    }

    pub fn configure_command(&self, name: &str, config: &CommandConfig) {
        self.settings.configure_command(name, config);
    }

    /// Start `work` on circuit `name` without a fallback.
    pub fn go<T, W, Fut, E>(&self, name: &str, work: W) -> CommandHandle<T>
    where
        T: Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.launch(name, work, None)
    }

    /// Start `work` on circuit `name`; failures are offered to `fallback`.
    pub fn go_with_fallback<T, W, Fut, E, F, FFut, FE>(
        &self,
        name: &str,
        work: W,
        fallback: F,
    ) -> CommandHandle<T>
    where
        T: Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
        F: FnOnce(GuardError) -> FFut + Send + 'static,
        FFut: Future<Output = Result<T, FE>> + Send + 'static,
        FE: Into<BoxError>,
    {
        self.launch(name, work, Some(boxed_fallback(fallback)))
    }

    /// Run `work` and wait for the outcome.
    pub async fn run<T, W, Fut, E>(&self, name: &str, work: W) -> Result<T, GuardError>
    where
        T: Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.go(name, work).await
    }

    /// Run `work` with a fallback and wait for the outcome.
    pub async fn run_with_fallback<T, W, Fut, E, F, FFut, FE>(
        &self,
        name: &str,
        work: W,
        fallback: F,
    ) -> Result<T, GuardError>
    where
        T: Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
        F: FnOnce(GuardError) -> FFut + Send + 'static,
        FFut: Future<Output = Result<T, FE>> + Send + 'static,
        FE: Into<BoxError>,
    {
        self.go_with_fallback(name, work, fallback).await
    }

    fn launch<T, W, Fut, E>(&self, name: &str, work: W, fallback: Option<Fallback<T>>) -> CommandHandle<T>
    where
        T: Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let settings = self.settings.get_settings(name);
        let (circuit, _) = self.circuits.get_or_create(name);
        Command::new(circuit, settings, self.sinks.clone(), fallback).spawn(work)
    }

    pub fn get_or_create_circuit(&self, name: &str) -> (Arc<CircuitBreaker>, bool) {
        self.circuits.get_or_create(name)
    }

    pub fn circuit(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.get(name)
    }

    pub fn toggle_force_open(&self, name: &str, force_open: bool) -> Result<(), GuardError> {
        self.circuits.toggle_force_open(name, force_open)
    }

    pub fn flush_all(&self) {
        self.circuits.flush_all();
    }

    pub fn flush_by_name(&self, name: &str) -> bool {
        self.circuits.flush_by_name(name)
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        self.circuits.snapshots()
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("settings", &self.settings)
            .field("circuits", &self.circuits)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
