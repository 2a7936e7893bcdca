//! Background eviction of idle registry entries.
//!
//! One sweeper per registry, with a `Created -> Running -> Stopped` lifecycle.
//! `stop()` only signals the task; it does not wait for an in-flight sweep.

use super::registry::BucketRegistry;
use crate::errors::{AdmissionError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, info};

/// Sweep schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Time between sweeps
    #[serde(rename = "interval_secs", with = "crate::config::serde_secs")]
    pub interval: Duration,

    /// Entries idle longer than this are evicted
    #[serde(rename = "retention_secs", with = "crate::config::serde_secs")]
    pub retention: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    Created,
    Running,
    Stopped,
}

enum Lifecycle {
    Created,
    Running(oneshot::Sender<()>),
    Stopped,
}

/// Periodic task pruning one [`BucketRegistry`]
pub struct Sweeper {
    name: String,
    registry: Arc<BucketRegistry>,
    config: SweeperConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl Sweeper {
    pub fn new(name: impl Into<String>, registry: Arc<BucketRegistry>, config: SweeperConfig) -> Self {
        Self {
            name: name.into(),
            registry,
            config,
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    pub fn state(&self) -> SweeperState {
        match *self.lifecycle.lock() {
            Lifecycle::Created => SweeperState::Created,
            Lifecycle::Running(_) => SweeperState::Running,
            Lifecycle::Stopped => SweeperState::Stopped,
        }
    }

    pub fn config(&self) -> SweeperConfig {
        self.config
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// Fails if already started, if stopped, or outside a runtime.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running(_) => {
                return Err(AdmissionError::SweeperState(format!(
                    "sweeper for '{}' is already running",
                    self.name
                )))
            }
            Lifecycle::Stopped => {
                return Err(AdmissionError::SweeperState(format!(
                    "sweeper for '{}' was stopped and cannot be restarted",
                    self.name
                )))
            }
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| AdmissionError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        handle.spawn(sweep_loop(
            self.name.clone(),
            Arc::clone(&self.registry),
            self.config,
            shutdown_rx,
        ));
        *lifecycle = Lifecycle::Running(shutdown_tx);

        info!(
            gate = %self.name,
            interval_secs = self.config.interval.as_secs_f64(),
            retention_secs = self.config.retention.as_secs_f64(),
            "Eviction sweeper started"
        );
        Ok(())
    }

    /// Signal the loop to stop. No-op unless running.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(shutdown_tx) => {
                // The loop may already be gone if the runtime shut down
                let _ = shutdown_tx.send(());
                info!(gate = %self.name, "Eviction sweeper stopped");
            }
            other => *lifecycle = other,
        }
    }

    /// Run a single sweep now
    pub fn sweep_once(&self) -> usize {
        sweep(&self.name, &self.registry, self.config.retention)
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(
    name: String,
    registry: Arc<BucketRegistry>,
    config: SweeperConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(TokioInstant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&name, &registry, config.retention);
            }
            // Fires on stop() and when the sender is dropped
            _ = &mut shutdown_rx => break,
        }
    }

    debug!(gate = %name, "Eviction sweeper loop exited");
}

fn sweep(name: &str, registry: &BucketRegistry, retention: Duration) -> usize {
    let evicted = registry.evict_idle(std::time::Instant::now(), retention);
    let remaining = registry.len();

    crate::metrics::record_sweep(name, evicted, remaining);
    if evicted > 0 {
        debug!(gate = %name, evicted, remaining, "Evicted idle clients");
    }
    evicted
}
