use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter_vec, CounterVec, Gauge, GaugeVec, HistogramVec, IntCounterVec,
};

lazy_static! {
    // Decision metrics
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "admitr_decisions_total",
        "Total number of admission decisions",
        &["gate", "allowed"]
    ).unwrap();

    pub static ref DECISION_DURATION: HistogramVec = register_histogram_vec!(
        "admitr_decision_duration_seconds",
        "Admission decision duration in seconds",
        &["gate"],
        vec![0.000001, 0.000005, 0.00001, 0.000025, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.005]
    ).unwrap();

    // Registry metrics
    pub static ref BUCKETS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admitr_buckets_created_total",
        "Total number of client buckets created",
        &["gate"]
    ).unwrap();

    pub static ref REGISTRY_ENTRIES: GaugeVec = register_gauge_vec!(
        "admitr_registry_entries",
        "Number of tracked clients per gate",
        &["gate"]
    ).unwrap();

    // Sweeper metrics
    pub static ref SWEEPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admitr_sweeps_total",
        "Total number of eviction sweeps",
        &["gate"]
    ).unwrap();

    pub static ref EVICTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admitr_evictions_total",
        "Total number of idle clients evicted",
        &["gate"]
    ).unwrap();

    // Config metrics
    pub static ref CONFIG_RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "admitr_config_reloads_total",
        "Total number of configuration reloads",
        &["result"]
    ).unwrap();

    pub static ref ACTIVE_GATES: Gauge = register_gauge!(
        "admitr_active_gates",
        "Number of admission gates configured"
    ).unwrap();
}

/// Record one admission decision
pub fn record_decision(gate: &str, allowed: bool, duration_secs: f64) {
    let allowed_str = if allowed { "true" } else { "false" };
    DECISIONS_TOTAL
        .with_label_values(&[gate, allowed_str])
        .inc();

    DECISION_DURATION
        .with_label_values(&[gate])
        .observe(duration_secs);
}

/// Record a new client bucket
pub fn record_bucket_created(gate: &str, registry_len: usize) {
    BUCKETS_CREATED_TOTAL.with_label_values(&[gate]).inc();
    REGISTRY_ENTRIES
        .with_label_values(&[gate])
        .set(registry_len as f64);
}

/// Record a completed sweep
pub fn record_sweep(gate: &str, evicted: usize, remaining: usize) {
    SWEEPS_TOTAL.with_label_values(&[gate]).inc();
    EVICTIONS_TOTAL
        .with_label_values(&[gate])
        .inc_by(evicted as u64);
    REGISTRY_ENTRIES
        .with_label_values(&[gate])
        .set(remaining as f64);
}

/// Update config metrics
pub fn update_active_gates(gate_count: usize) {
    ACTIVE_GATES.set(gate_count as f64);
}

/// Record config reload
pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "error" };
    CONFIG_RELOADS_TOTAL
        .with_label_values(&[result])
        .inc();
}
