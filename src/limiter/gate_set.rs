//! Named collection of independently configured admission gates.

use super::gate::AdmissionGate;
use super::sweeper::{SweeperConfig, SweeperState};
use super::Decision;
use crate::config::AdmissionConfig;
use crate::errors::{AdmissionError, Result};
use crate::identity::{ClientSignals, IdentityResolver, TrustPolicy};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Gates keyed by endpoint class, sharing one identity resolver
pub struct GateSet {
    gates: DashMap<String, Arc<AdmissionGate>>,
    resolver: Arc<IdentityResolver>,
    sweeper: SweeperConfig,
}

impl GateSet {
    /// Build every configured gate. Sweepers are not started.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self> {
        let resolver = Arc::new(IdentityResolver::new(config.trust.clone()));
        let gates = DashMap::new();

        for gate_config in &config.gates {
            let gate = AdmissionGate::new(gate_config.clone(), Arc::clone(&resolver), config.sweeper)?;
            if gates.insert(gate_config.name.clone(), Arc::new(gate)).is_some() {
                return Err(AdmissionError::ConfigurationError(format!(
                    "duplicate gate name '{}'",
                    gate_config.name
                )));
            }
        }

        Ok(Self {
            gates,
            resolver,
            sweeper: config.sweeper,
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<AdmissionGate>> {
        self.gates.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn gate(&self, name: &str) -> Result<Arc<AdmissionGate>> {
        self.get(name)
            .ok_or_else(|| AdmissionError::UnknownGate(name.to_string()))
    }

    /// Run a request through the named gate
    pub fn admit(&self, name: &str, signals: &ClientSignals) -> Result<Decision> {
        Ok(self.gate(name)?.admit(signals))
    }

    /// Start every sweeper that has not been started yet
    pub fn start_all(&self) -> Result<()> {
        for entry in self.gates.iter() {
            if entry.value().sweeper_state() == SweeperState::Created {
                entry.value().start()?;
            }
        }
        crate::metrics::update_active_gates(self.gates.len());
        Ok(())
    }

    pub fn stop_all(&self) {
        for entry in self.gates.iter() {
            entry.value().stop();
        }
    }

    /// Build the set for a new configuration, carrying over unchanged gates.
    ///
    /// A gate is kept (with its clients' quota state and running sweeper) when
    /// its limits, the trust policy and the sweep schedule are all unchanged.
    /// New gates are started; gates of `self` that did not carry over are stopped.
    pub fn reconcile(&self, config: &AdmissionConfig) -> Result<GateSet> {
        let shared_settings = config.trust == *self.resolver.policy() && config.sweeper == self.sweeper;
        let resolver = if shared_settings {
            Arc::clone(&self.resolver)
        } else {
            Arc::new(IdentityResolver::new(config.trust.clone()))
        };

        let gates = DashMap::new();
        for gate_config in &config.gates {
            let reusable = self
                .get(&gate_config.name)
                .filter(|old| shared_settings && old.config() == gate_config);

            let gate = match reusable {
                Some(old) => {
                    debug!(gate = %gate_config.name, "Keeping unchanged gate");
                    old
                }
                None => Arc::new(AdmissionGate::new(
                    gate_config.clone(),
                    Arc::clone(&resolver),
                    config.sweeper,
                )?),
            };

            if gates.insert(gate_config.name.clone(), gate).is_some() {
                return Err(AdmissionError::ConfigurationError(format!(
                    "duplicate gate name '{}'",
                    gate_config.name
                )));
            }
        }

        let next = GateSet {
            gates,
            resolver,
            sweeper: config.sweeper,
        };
        next.start_all()?;

        for entry in self.gates.iter() {
            let carried = next
                .get(entry.key())
                .is_some_and(|gate| Arc::ptr_eq(&gate, entry.value()));
            if !carried {
                info!(gate = %entry.key(), "Retiring gate");
                entry.value().stop();
            }
        }

        Ok(next)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gates.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn trust_policy(&self) -> &TrustPolicy {
        self.resolver.policy()
    }
}
