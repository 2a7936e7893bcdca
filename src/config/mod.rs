pub mod loader;
pub mod validator;
pub mod watcher;

use crate::identity::TrustPolicy;
use crate::limiter::{GateConfig, SweeperConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process settings (loaded from environment variables only)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path of the admission configuration file
    pub config_path: PathBuf,

    /// Port for the Prometheus metrics endpoint
    pub metrics_port: u16,

    /// Reload the admission configuration when the file changes
    pub watch_config: bool,
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("ADMISSION_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/admission.json")),

            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9090),

            watch_config: std::env::var("ADMISSION_WATCH_CONFIG")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/admission.json"),
            metrics_port: 9090,
            watch_config: true,
        }
    }
}

/// Admission configuration (loaded from JSON file, supports hot reload)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Which identity headers to believe
    #[serde(default)]
    pub trust: TrustPolicy,

    /// Eviction schedule shared by every gate's sweeper
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// One entry per endpoint class
    #[serde(default = "default_gates")]
    pub gates: Vec<GateConfig>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            trust: TrustPolicy::default(),
            sweeper: SweeperConfig::default(),
            gates: default_gates(),
        }
    }
}

/// Standard endpoint classes: strict on account creation and login,
/// looser on public reads and authenticated traffic
fn default_gates() -> Vec<GateConfig> {
    vec![
        GateConfig::new("register", 5, Duration::from_secs(60 * 60), 1),
        GateConfig::new("login", 10, Duration::from_secs(15 * 60), 3),
        GateConfig::new("public", 60, Duration::from_secs(60), 10),
        GateConfig::new("authenticated", 200, Duration::from_secs(60), 30),
    ]
}

/// Durations as (possibly fractional) seconds
pub(crate) mod serde_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}
