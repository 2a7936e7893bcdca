pub mod gate;
pub mod gate_set;
pub mod registry;
pub mod sweeper;
pub mod token_bucket;

pub use gate::{AdmissionGate, GateConfig};
pub use gate_set::GateSet;
pub use registry::{BucketRegistry, RegistryEntry};
pub use sweeper::{Sweeper, SweeperConfig, SweeperState};
pub use token_bucket::TokenBucket;

use std::time::Duration;

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Client key the decision was made for
    pub key: String,

    /// Events granted per window
    pub limit: u32,

    /// Window over which `limit` applies
    pub window: Duration,

    /// Whole tokens left after this check
    pub remaining: u32,

    /// Time until the next token, set only on denial
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// Window text such as "1h0m0s", "15m0s" or "1m30s"
    pub fn window_description(&self) -> String {
        describe_window(self.window)
    }

    /// Response headers for client backoff guidance
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Window", self.window_description()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            headers.push(("Retry-After", retry_after_secs(retry_after).to_string()));
        }
        headers
    }
}

/// Whole seconds, rounded up, never zero
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait
        .as_secs()
        .saturating_add(u64::from(wait.subsec_nanos() > 0));
    secs.max(1)
}

/// Window text in h/m/s form, e.g. "1h0m0s", "15m0s", "1m30s", "1.5s", "250ms"
pub fn describe_window(window: Duration) -> String {
    if window.is_zero() {
        return "0s".to_string();
    }

    let nanos = window.subsec_nanos() as u64;
    if window < Duration::from_secs(1) {
        return match nanos {
            n if n < 1_000 => format!("{}ns", n),
            n if n < 1_000_000 => format!("{}µs", with_fraction(n, 1_000)),
            n => format!("{}ms", with_fraction(n, 1_000_000)),
        };
    }

    let total = window.as_secs();
    let (hours, minutes) = (total / 3600, (total % 3600) / 60);
    let seconds = with_fraction((total % 60) * 1_000_000_000 + nanos, 1_000_000_000);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `value / unit` as decimal text without trailing zeros; `unit` is a power of ten
fn with_fraction(value: u64, unit: u64) -> String {
    let (whole, frac) = (value / unit, value % unit);
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Requests the HTTP layer should not send through a gate: pre-flight and the root health check
pub fn is_exempt(method: &str, path: &str) -> bool {
    method.eq_ignore_ascii_case("OPTIONS") || path == "/"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool, retry_after: Option<Duration>) -> Decision {
        Decision {
            allowed,
            key: "203.0.113.1".to_string(),
            limit: 10,
            window: Duration::from_secs(15 * 60),
            remaining: 0,
            retry_after,
        }
    }

    #[test]
    fn test_describe_window() {
        assert_eq!(describe_window(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(describe_window(Duration::from_secs(15 * 60)), "15m0s");
        assert_eq!(describe_window(Duration::from_secs(60)), "1m0s");
        assert_eq!(describe_window(Duration::from_secs(90)), "1m30s");
        assert_eq!(describe_window(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(describe_window(Duration::from_secs(7)), "7s");
        assert_eq!(describe_window(Duration::from_millis(1500)), "1.5s");
        assert_eq!(describe_window(Duration::from_millis(250)), "250ms");
        assert_eq!(describe_window(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(describe_window(Duration::from_nanos(2500)), "2.5µs");
        assert_eq!(describe_window(Duration::from_nanos(40)), "40ns");
        assert_eq!(describe_window(Duration::ZERO), "0s");
    }

    #[test]
    fn test_retry_after_secs_saturates() {
        assert_eq!(retry_after_secs(Duration::MAX), u64::MAX);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
    }

    #[test]
    fn test_headers_on_denial() {
        let headers = decision(false, Some(Duration::from_millis(1200))).headers();
        assert_eq!(
            headers,
            vec![
                ("X-RateLimit-Limit", "10".to_string()),
                ("X-RateLimit-Window", "15m0s".to_string()),
                ("X-RateLimit-Remaining", "0".to_string()),
                ("Retry-After", "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_headers_on_allow_have_no_retry_after() {
        let headers = decision(true, None).headers();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(|(name, _)| *name != "Retry-After"));
    }

    #[test]
    fn test_is_exempt() {
        assert!(is_exempt("OPTIONS", "/api/trainers"));
        assert!(is_exempt("options", "/api/trainers"));
        assert!(is_exempt("GET", "/"));
        assert!(!is_exempt("POST", "/api/trainers/login"));
    }
}
