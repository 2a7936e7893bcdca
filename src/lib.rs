pub mod config;
pub mod errors;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod metrics_server;

// Re-export commonly used types
pub use config::{AdmissionConfig, RuntimeConfig};
pub use errors::{AdmissionError, Result};
pub use identity::{ClientSignals, IdentityResolver, TrustPolicy};
pub use limiter::{is_exempt, AdmissionGate, Decision, GateConfig, GateSet, SweeperConfig};
