use crate::config::validator::validate_config;
use crate::config::AdmissionConfig;
use crate::errors::Result;
use std::path::Path;
use tracing::{debug, info};

/// Load admission configuration from a JSON file
pub async fn load_admission_config_from_file<P: AsRef<Path>>(path: P) -> Result<AdmissionConfig> {
    let path = path.as_ref();
    info!("Loading admission configuration from: {}", path.display());

    let contents = tokio::fs::read_to_string(path).await?;
    let config = parse_admission_config(&contents)?;

    info!("Admission configuration loaded and validated successfully");
    log_config_summary(&config);

    Ok(config)
}

/// Load the configuration file, or the built-in endpoint classes if it does not exist
pub async fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<AdmissionConfig> {
    let path = path.as_ref();
    if tokio::fs::try_exists(path).await? {
        return load_admission_config_from_file(path).await;
    }

    info!(
        "No admission configuration at {}; using built-in endpoint classes",
        path.display()
    );
    let config = AdmissionConfig::default();
    validate_config(&config)?;
    log_config_summary(&config);
    Ok(config)
}

/// Parse and validate configuration text
pub fn parse_admission_config(contents: &str) -> Result<AdmissionConfig> {
    let config: AdmissionConfig = serde_json::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn log_config_summary(config: &AdmissionConfig) {
    debug!("=== Admission Configuration Summary ===");
    debug!(
        "Trust: forwarded_for={} (filter_private={}), real_ip={}, cdn_ip={} (filter_private={})",
        config.trust.trust_forwarded_for,
        config.trust.filter_private_forwarded,
        config.trust.trust_real_ip,
        config.trust.trust_cdn_ip,
        config.trust.filter_private_direct
    );
    debug!(
        "Sweeper: every {:.0}s, retention {:.0}s",
        config.sweeper.interval.as_secs_f64(),
        config.sweeper.retention.as_secs_f64()
    );

    info!("Admission gates: {}", config.gates.len());
    for gate in &config.gates {
        info!(
            "  - {}: {} per {:.0}s ({:.4} tokens/sec), burst: {}",
            gate.name,
            gate.max_events,
            gate.window.as_secs_f64(),
            gate.refill_rate(),
            gate.burst
        );
    }
    debug!("=======================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdmissionError;
    use std::io::Write;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "gates": [ {{ "name": "uploads", "max_events": 3, "window_secs": 60, "burst": 1 }} ] }}"#
        )
        .unwrap();

        let config = load_admission_config_from_file(file.path()).await.unwrap();
        assert_eq!(config.gates.len(), 1);
        assert_eq!(config.gates[0].name, "uploads");
        assert_eq!(config.gates[0].window, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_load_invalid_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "gates": [ {{ "name": "uploads", "max_events": 3, "window_secs": 0, "burst": 1 }} ] }}"#
        )
        .unwrap();

        let err = load_admission_config_from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidLimit(_)));
    }

    #[tokio::test]
    async fn test_load_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_admission_config_from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, AdmissionError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, AdmissionConfig::default());

        let err = load_admission_config_from_file(dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, AdmissionError::FileSystemError(_)));
    }
}
