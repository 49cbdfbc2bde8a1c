//! Circuit registry: name → breaker directory.
//!
//! # Responsibilities
//! - Create breakers lazily on first use
//! - Enumerate and snapshot live circuits
//! - Flush circuits (drop state and rolling metrics)
//! - Apply administrative force-open toggles

use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::settings::SettingsRegistry;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot};
use crate::resilience::error::GuardError;

/// Directory of live circuit breakers.
#[derive(Debug)]
pub struct CircuitRegistry {
    settings: SettingsRegistry,
    circuits: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitRegistry {
    pub fn new(settings: SettingsRegistry) -> Self {
        Self {
            settings,
            circuits: DashMap::new(),
        }
    }

    /// Return the breaker for `name`, creating it on first use.
    ///
    /// The flag is true when this call created the breaker.
    pub fn get_or_create(&self, name: &str) -> (Arc<CircuitBreaker>, bool) {
        if let Some(existing) = self.circuits.get(name) {
            return (existing.value().clone(), false);
        }

        match self.circuits.entry(name.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let circuit = Arc::new(CircuitBreaker::new(name, self.settings.clone()));
                entry.insert(circuit.clone());
                tracing::info!(circuit = %name, "Circuit registered");
                (circuit, true)
            }
        }
    }

    /// Look up an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.get(name).map(|entry| entry.value().clone())
    }

    /// Flip force-open on an existing breaker.
    pub fn toggle_force_open(&self, name: &str, force_open: bool) -> Result<(), GuardError> {
        let circuit = self
            .get(name)
            .ok_or_else(|| GuardError::UnknownCircuit(name.to_string()))?;
        circuit.set_force_open(force_open);
        Ok(())
    }

    /// Reset and remove every breaker.
    pub fn flush_all(&self) {
        let count = self.circuits.len();
        self.circuits.retain(|_, circuit| {
            circuit.reset_metrics();
            false
        });
        tracing::info!(circuits = count, "All circuits flushed");
    }

    /// Reset and remove one breaker; false if it did not exist.
    pub fn flush_by_name(&self, name: &str) -> bool {
        match self.circuits.remove(name) {
            Some((_, circuit)) => {
                circuit.reset_metrics();
                tracing::info!(circuit = %name, "Circuit flushed");
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuits.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Snapshots of every circuit, ordered by name.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> =
            self.circuits.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rolling::Outcome;

    #[test]
    fn test_lazy_creation() {
        let registry = CircuitRegistry::new(SettingsRegistry::new());
        let (a, created) = registry.get_or_create("a");
        assert!(created);
        let (again, created) = registry.get_or_create("a");
        assert!(!created);
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(registry.names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_toggle_unknown_circuit() {
        let registry = CircuitRegistry::new(SettingsRegistry::new());
        let err = registry.toggle_force_open("ghost", true).unwrap_err();
        assert!(matches!(err, GuardError::UnknownCircuit(name) if name == "ghost"));
    }

    #[test]
    fn test_toggle_known_circuit() {
        let registry = CircuitRegistry::new(SettingsRegistry::new());
        let (circuit, _) = registry.get_or_create("db");
        registry.toggle_force_open("db", true).unwrap();
        assert!(!circuit.allow_request());
    }

    #[test]
    fn test_flush() {
        let registry = CircuitRegistry::new(SettingsRegistry::new());
        let (a, _) = registry.get_or_create("a");
        registry.get_or_create("b");
        a.report(Outcome::Failure);

        assert!(registry.flush_by_name("a"));
        assert!(!registry.flush_by_name("a"));
        assert_eq!(a.metrics().volume(), 0);
        assert_eq!(registry.names(), vec!["b".to_string()]);

        registry.flush_all();
        assert!(registry.is_empty());

        let (fresh, created) = registry.get_or_create("a");
        assert!(created);
        assert!(!Arc::ptr_eq(&a, &fresh));
    }
}
