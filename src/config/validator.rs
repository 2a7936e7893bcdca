use crate::config::AdmissionConfig;
use crate::errors::{AdmissionError, Result};
use crate::identity::TrustPolicy;
use crate::limiter::{GateConfig, SweeperConfig};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Validate the entire admission configuration
pub fn validate_config(config: &AdmissionConfig) -> Result<()> {
    debug!("Validating configuration...");

    validate_trust_policy(&config.trust)?;
    validate_sweeper_config(&config.sweeper)?;

    if config.gates.is_empty() {
        warn!("No admission gates configured; every endpoint class lookup will fail");
    }

    let mut seen = HashSet::new();
    for gate in &config.gates {
        if !seen.insert(gate.name.as_str()) {
            return Err(AdmissionError::ConfigurationError(format!(
                "Gate '{}' is defined more than once",
                gate.name
            )));
        }
        validate_gate_config(gate)?;
    }

    debug!("Configuration validation successful");
    Ok(())
}

fn validate_trust_policy(policy: &TrustPolicy) -> Result<()> {
    let headers = [
        ("forwarded_for_header", &policy.forwarded_for_header),
        ("real_ip_header", &policy.real_ip_header),
        ("cdn_ip_header", &policy.cdn_ip_header),
    ];
    for (field, value) in headers {
        if value.trim().is_empty() {
            return Err(AdmissionError::ConfigurationError(format!(
                "{} cannot be empty",
                field
            )));
        }
    }

    if policy.trust_forwarded_for && !policy.filter_private_forwarded {
        warn!("Forwarded-chain header is trusted without filtering internal addresses");
    }

    Ok(())
}

fn validate_sweeper_config(config: &SweeperConfig) -> Result<()> {
    if config.interval.is_zero() {
        return Err(AdmissionError::ConfigurationError(
            "Sweeper interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.retention < config.interval {
        return Err(AdmissionError::ConfigurationError(format!(
            "Sweeper retention_secs ({:.2}) must not be shorter than interval_secs ({:.2})",
            config.retention.as_secs_f64(),
            config.interval.as_secs_f64()
        )));
    }

    debug!("Sweeper configuration valid");
    Ok(())
}

/// Validate one gate's limits
fn validate_gate_config(gate: &GateConfig) -> Result<()> {
    if gate.name.trim().is_empty() {
        return Err(AdmissionError::ConfigurationError(
            "Gate name cannot be empty".to_string(),
        ));
    }

    gate.validate()?;

    if gate.burst > 1_000_000 {
        warn!("Very high burst ({}) for gate '{}'", gate.burst, gate.name);
    }

    if gate.window > Duration::from_secs(24 * 60 * 60) {
        warn!(
            "Window for gate '{}' is longer than a day ({:.2} hours)",
            gate.name,
            gate.window.as_secs_f64() / 3600.0
        );
    }

    // Time for an empty bucket to refill completely
    let seconds_to_fill = gate.burst as f64 / gate.refill_rate();
    if seconds_to_fill > 86400.0 {
        warn!(
            "Gate '{}' takes {:.2} hours to refill its burst",
            gate.name,
            seconds_to_fill / 3600.0
        );
    }

    debug!("Gate configuration valid for '{}'", gate.name);
    Ok(())
}
