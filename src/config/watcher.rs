//! Notify-based configuration hot-reload watcher.
//!
//! - Watches a single JSON file using notify::RecommendedWatcher.
//! - On create/modify events, reloads and validates the file, reconciles the
//!   live gate set against it and atomically swaps the result in.

use crate::config::loader::load_admission_config_from_file;
use crate::errors::AdmissionError;
use crate::limiter::GateSet;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watch the configuration file and reload the gate set on change.
///
/// Runs until the watcher's event channel closes.
pub async fn watch_config_file(
    path: PathBuf,
    shared_gates: Arc<ArcSwap<GateSet>>,
) -> Result<(), notify::Error> {
    // Bridges the watcher's sync callback thread into this task
    let (tx, mut rx) = mpsc::channel(16);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Err(e) = tx.blocking_send(res) {
                // Receiver gone: the watch task has ended
                debug!("Failed to send config file event: {}", e);
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!("Watching config file for changes: {}", path.display());

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => {
                if should_reload(&event) {
                    info!(
                        "Config file change detected. Event: {:?}. Triggering reload.",
                        event.kind
                    );
                    reload_config(&path, &shared_gates).await;
                } else {
                    debug!("Ignoring irrelevant filesystem event: {:?}", event.kind);
                }
            }
            Err(e) => {
                crate::metrics::record_config_reload(false);
                error!("Error watching config file: {}", e);
            }
        }
    }

    warn!("Configuration watcher task is shutting down.");
    Ok(())
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
    )
}

/// Load, reconcile and swap. Any failure keeps the current gate set.
///
/// Returns whether a new gate set was installed.
pub async fn reload_config(path: &Path, shared_gates: &ArcSwap<GateSet>) -> bool {
    let config = match load_admission_config_from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            crate::metrics::record_config_reload(false);
            match e {
                AdmissionError::FileSystemError(io_err) => error!(
                    "Failed to read config file '{}': {}. Keeping old config.",
                    path.display(),
                    io_err
                ),
                AdmissionError::JsonError(json_err) => error!(
                    "Failed to parse JSON from '{}': {}. Keeping old config.",
                    path.display(),
                    json_err
                ),
                other if other.is_configuration() => error!(
                    "New configuration in '{}' is invalid: {}. Keeping old config.",
                    path.display(),
                    other
                ),
                other => error!(
                    "An unexpected error occurred while reloading config: {}. Keeping old config.",
                    other
                ),
            }
            return false;
        }
    };

    let current = shared_gates.load_full();
    match current.reconcile(&config) {
        Ok(next) => {
            let gate_count = next.len();
            shared_gates.store(Arc::new(next));
            crate::metrics::record_config_reload(true);
            info!(
                "Configuration hot-reloaded successfully. {} gates active.",
                gate_count
            );
            true
        }
        Err(e) => {
            crate::metrics::record_config_reload(false);
            error!("Failed to apply new configuration: {}. Keeping old config.", e);
            false
        }
    }
}
