use super::registry::BucketRegistry;
use super::sweeper::{Sweeper, SweeperConfig, SweeperState};
use super::Decision;
use crate::errors::{AdmissionError, Result};
use crate::identity::{ClientSignals, IdentityResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Limits for one endpoint class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Endpoint class name (e.g. "login")
    pub name: String,

    /// Events granted per window
    pub max_events: u32,

    /// Window over which `max_events` accrue
    #[serde(rename = "window_secs", with = "crate::config::serde_secs")]
    pub window: Duration,

    /// Bucket capacity
    pub burst: u32,
}

impl GateConfig {
    pub fn new(name: impl Into<String>, max_events: u32, window: Duration, burst: u32) -> Self {
        Self {
            name: name.into(),
            max_events,
            window,
            burst,
        }
    }

    /// Reject limits that would make the bucket meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(AdmissionError::InvalidLimit(format!(
                "max_events must be positive for gate '{}'",
                self.name
            )));
        }
        if self.window.is_zero() {
            return Err(AdmissionError::InvalidLimit(format!(
                "window must be positive for gate '{}'",
                self.name
            )));
        }
        if self.burst == 0 {
            return Err(AdmissionError::InvalidLimit(format!(
                "burst must be at least 1 for gate '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Tokens per second
    pub fn refill_rate(&self) -> f64 {
        self.max_events as f64 / self.window.as_secs_f64()
    }
}

/// Admission entry point for one endpoint class.
///
/// Owns its registry and sweeper; gates never share quota state.
pub struct AdmissionGate {
    config: GateConfig,
    resolver: Arc<IdentityResolver>,
    registry: Arc<BucketRegistry>,
    sweeper: Sweeper,
}

impl AdmissionGate {
    /// Build a gate, validating its limits eagerly. The sweeper is not started.
    pub fn new(config: GateConfig, resolver: Arc<IdentityResolver>, sweeper_config: SweeperConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(BucketRegistry::new(config.burst as f64, config.refill_rate()));
        let sweeper = Sweeper::new(config.name.clone(), Arc::clone(&registry), sweeper_config);

        debug!(
            gate = %config.name,
            max_events = config.max_events,
            window_secs = config.window.as_secs_f64(),
            burst = config.burst,
            "Admission gate created"
        );

        Ok(Self {
            config,
            resolver,
            registry,
            sweeper,
        })
    }

    /// Decide on one inbound request
    pub fn admit(&self, signals: &ClientSignals) -> Decision {
        self.admit_at(signals, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock reading
    pub fn admit_at(&self, signals: &ClientSignals, now: Instant) -> Decision {
        let key = self.resolver.resolve(signals);
        self.admit_key(key, now)
    }

    /// Decide for an already resolved client key
    pub fn admit_key(&self, key: impl Into<String>, now: Instant) -> Decision {
        let started = Instant::now();
        let key = key.into();

        let (entry, created) = self.registry.get_or_create(&key, now);
        let (allowed, remaining, retry_after) = {
            let mut bucket = entry.bucket();
            let allowed = bucket.try_consume(now);
            let retry_after = if allowed { None } else { Some(bucket.time_until_available()) };
            (allowed, bucket.tokens().floor() as u32, retry_after)
        };

        if created {
            crate::metrics::record_bucket_created(&self.config.name, self.registry.len());
        }
        crate::metrics::record_decision(&self.config.name, allowed, started.elapsed().as_secs_f64());

        if !allowed {
            debug!(gate = %self.config.name, key = %key, "Request denied");
        }

        Decision {
            allowed,
            key,
            limit: self.config.max_events,
            window: self.config.window,
            remaining,
            retry_after,
        }
    }

    /// Start the eviction sweeper
    pub fn start(&self) -> Result<()> {
        self.sweeper.start()
    }

    /// Signal the eviction sweeper to stop
    pub fn stop(&self) {
        self.sweeper.stop()
    }

    pub fn sweeper_state(&self) -> SweeperState {
        self.sweeper.state()
    }

    /// Evict idle clients now, outside the sweeper schedule
    pub fn sweep_now(&self) -> usize {
        self.sweeper.sweep_once()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.resolver
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        self.sweeper.config()
    }

    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("config", &self.config)
            .field("clients", &self.registry.len())
            .field("sweeper", &self.sweeper.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn gate(max_events: u32, window: Duration, burst: u32) -> AdmissionGate {
        AdmissionGate::new(
            GateConfig::new("test", max_events, window, burst),
            Arc::new(IdentityResolver::default()),
            SweeperConfig::default(),
        )
        .unwrap()
    }

    fn client(ip: &str) -> ClientSignals {
        ClientSignals::from_peer(ip.parse().unwrap())
    }

    #[test]
    fn test_rejects_invalid_limits() {
        let resolver = Arc::new(IdentityResolver::default());
        let invalid = [
            GateConfig::new("zero-events", 0, Duration::from_secs(60), 1),
            GateConfig::new("zero-window", 10, Duration::ZERO, 1),
            GateConfig::new("zero-burst", 10, Duration::from_secs(60), 0),
        ];
        for config in invalid {
            let result = AdmissionGate::new(config, Arc::clone(&resolver), SweeperConfig::default());
            assert!(matches!(result, Err(AdmissionError::InvalidLimit(_))));
        }
    }

    #[test]
    fn test_fresh_client_gets_exactly_burst() {
        let gate = gate(60, Duration::from_secs(60), 10);
        let now = Instant::now();
        let signals = client("203.0.113.1");

        for i in 0..10 {
            assert!(gate.admit_at(&signals, now).allowed, "request {} should pass", i);
        }
        let denied = gate.admit_at(&signals, now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_one_more_after_refill_period() {
        // 2 per second: one token every 500ms
        let gate = gate(2, Duration::from_secs(1), 3);
        let start = Instant::now();
        let signals = client("203.0.113.1");

        for _ in 0..3 {
            assert!(gate.admit_at(&signals, start).allowed);
        }
        assert!(!gate.admit_at(&signals, start).allowed);

        let later = start + Duration::from_millis(500);
        assert!(gate.admit_at(&signals, later).allowed);
        assert!(!gate.admit_at(&signals, later).allowed);
    }

    #[test]
    fn test_uneven_refill_periods_admit_after_one_period() {
        // Periods with no exact nanosecond representation
        for (max_events, window_secs) in [(49u32, 1u64), (3, 7), (17, 60)] {
            let gate = gate(max_events, Duration::from_secs(window_secs), 1);
            let start = Instant::now();

            assert!(gate.admit_key("k", start).allowed);
            assert!(!gate.admit_key("k", start).allowed);

            let period = Duration::from_secs_f64(window_secs as f64 / max_events as f64);
            assert!(
                gate.admit_key("k", start + period).allowed,
                "{} per {}s denied after one period",
                max_events,
                window_secs
            );
        }
    }

    #[test]
    fn test_waiting_retry_after_always_admits() {
        for (max_events, window_secs) in [(49u32, 1u64), (3, 7), (17, 60)] {
            let gate = gate(max_events, Duration::from_secs(window_secs), 1);
            let start = Instant::now();

            assert!(gate.admit_key("k", start).allowed);
            let denied = gate.admit_key("k", start);
            assert!(!denied.allowed);

            let wait = denied.retry_after.unwrap();
            assert!(
                gate.admit_key("k", start + wait).allowed,
                "{} per {}s denied after waiting {:?}",
                max_events,
                window_secs,
                wait
            );
        }
    }

    #[test]
    fn test_huge_window_denial_headers() {
        let gate = gate(1, Duration::from_secs(u64::MAX), 1);
        let now = Instant::now();

        assert!(gate.admit_key("k", now).allowed);
        let denied = gate.admit_key("k", now);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::MAX));

        let headers = denied.headers();
        assert_eq!(
            headers.last(),
            Some(&("Retry-After", u64::MAX.to_string()))
        );
    }

    #[test]
    fn test_clients_do_not_share_quota() {
        let gate = gate(1, Duration::from_secs(3600), 2);
        let now = Instant::now();
        let a = client("203.0.113.1");
        let b = client("203.0.113.2");

        assert!(gate.admit_at(&a, now).allowed);
        assert!(gate.admit_at(&a, now).allowed);
        assert!(!gate.admit_at(&a, now).allowed);

        assert!(gate.admit_at(&b, now).allowed);
        assert!(gate.admit_at(&b, now).allowed);
        assert_eq!(gate.registry().len(), 2);
    }

    #[test]
    fn test_registration_scenario() {
        // 5 per hour, burst 1
        let gate = gate(5, Duration::from_secs(3600), 1);
        let start = Instant::now();
        let signals = client("203.0.113.77");

        let first = gate.admit_at(&signals, start);
        assert!(first.allowed);
        assert_eq!(first.limit, 5);
        assert_eq!(first.window_description(), "1h0m0s");

        assert!(!gate.admit_at(&signals, start + Duration::from_secs(1)).allowed);
        assert!(gate.admit_at(&signals, start + Duration::from_secs(12 * 60)).allowed);
    }

    #[test]
    fn test_admissions_bounded_per_window() {
        let max_events = 10;
        let burst = 4;
        let window = Duration::from_secs(10);
        let gate = gate(max_events, window, burst);
        let start = Instant::now();
        let signals = client("203.0.113.5");

        // One attempt every 10ms across a whole window
        let mut admitted = 0;
        for step in 0..=1000u64 {
            if gate.admit_at(&signals, start + Duration::from_millis(step * 10)).allowed {
                admitted += 1;
            }
        }
        assert!(admitted <= max_events + burst, "admitted {}", admitted);
        assert!(admitted >= max_events, "admitted {}", admitted);
    }

    #[test]
    fn test_concurrent_admits_for_same_key() {
        let gate = Arc::new(gate(10, Duration::from_secs(3600), 10));
        let barrier = Arc::new(Barrier::new(100));
        let now = Instant::now();

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.admit_key("203.0.113.9", now).allowed
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(allowed, 10);
        assert_eq!(gate.registry().len(), 1);
    }

    #[test]
    fn test_eviction_forgets_partial_consumption() {
        let gate = gate(1, Duration::from_secs(3600), 3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(gate.admit_key("client", start).allowed);
        }
        assert!(!gate.admit_key("client", start).allowed);

        let later = start + Duration::from_secs(60);
        assert_eq!(gate.registry().evict_idle(later, Duration::from_secs(30)), 1);

        let decision = gate.admit_key("client", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_unknown_clients_share_one_bucket() {
        let gate = gate(1, Duration::from_secs(3600), 1);
        let now = Instant::now();

        assert!(gate.admit_at(&ClientSignals::new(), now).allowed);
        let second = gate.admit_at(&ClientSignals::new().with_header("x-real-ip", "bogus"), now);
        assert!(!second.allowed);
        assert_eq!(second.key, crate::identity::UNKNOWN_CLIENT);
    }

    #[tokio::test]
    async fn test_gate_owns_sweeper_lifecycle() {
        let gate = gate(1, Duration::from_secs(60), 1);
        assert_eq!(gate.sweeper_state(), SweeperState::Created);

        gate.start().unwrap();
        assert_eq!(gate.sweeper_state(), SweeperState::Running);

        gate.stop();
        assert_eq!(gate.sweeper_state(), SweeperState::Stopped);
    }
}
