//! Prometheus metrics for Quantum-Chain subsystems.
//!
//! All metrics follow the naming convention: `qc_<subsystem>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., requests_total)
//! - **Gauge**: Value that can go up or down (e.g., streams_in_flight)
//! - **Histogram**: Distribution of values (e.g., request_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

/// Latency buckets for request/response round trips (seconds).
const REQUEST_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // HEADER EXCHANGE METRICS (Subsystem 18) - server side
    // =========================================================================

    /// Inbound header requests handled by the exchange server
    pub static ref HEADER_SERVER_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("qc_header_exchange_server_requests_total", "Inbound header requests served"),
        // mode: head/hash/height/range/unknown
        // outcome: found/not_found/malformed/timeout/invalid/store_error/io_error
        &["mode", "outcome"]
    ).expect("metric creation failed");

    /// Inbound streams closed because the concurrency limit was reached
    pub static ref HEADER_SERVER_STREAMS_REJECTED: Counter = Counter::new(
        "qc_header_exchange_server_streams_rejected_total",
        "Inbound streams rejected by the server concurrency limit"
    ).expect("metric creation failed");

    /// Inbound streams currently being served
    pub static ref HEADER_SERVER_STREAMS_IN_FLIGHT: Gauge = Gauge::new(
        "qc_header_exchange_server_streams_in_flight",
        "Inbound header exchange streams currently being served"
    ).expect("metric creation failed");

    // =========================================================================
    // HEADER EXCHANGE METRICS (Subsystem 18) - client side
    // =========================================================================

    /// Outbound header requests by operation and outcome
    pub static ref HEADER_CLIENT_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("qc_header_exchange_client_requests_total", "Outbound header requests"),
        &["operation", "outcome"]  // outcome: ok/not_found/connectivity/protocol/timeout/other
    ).expect("metric creation failed");

    /// Outbound request latency
    pub static ref HEADER_CLIENT_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "qc_header_exchange_client_request_duration_seconds",
            "Time from stream open to last response decoded"
        ).buckets(REQUEST_BUCKETS.to_vec()),
        &["operation"]
    ).expect("metric creation failed");

    /// Framed bytes moved by the exchange codec
    pub static ref HEADER_EXCHANGE_BYTES: CounterVec = CounterVec::new(
        Opts::new("qc_header_exchange_bytes_total", "Framed bytes written and read"),
        &["direction"]  // direction: sent/received
    ).expect("metric creation failed");

    // =========================================================================
    // ERROR METRICS
    // =========================================================================

    /// Subsystem errors by type
    pub static ref SUBSYSTEM_ERRORS: CounterVec = CounterVec::new(
        Opts::new("qc_subsystem_errors_total", "Errors by subsystem and type"),
        &["subsystem", "error_type"]
    ).expect("metric creation failed");
}

/// Handle to the registry the subsystem metrics live in.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    registry: &'static Registry,
}

impl MetricsHandle {
    /// Render the registry in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        encode_registry(self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless: already registered collectors
/// are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Header exchange server
        Box::new(HEADER_SERVER_REQUESTS.clone()),
        Box::new(HEADER_SERVER_STREAMS_REJECTED.clone()),
        Box::new(HEADER_SERVER_STREAMS_IN_FLIGHT.clone()),
        // Header exchange client
        Box::new(HEADER_CLIENT_REQUESTS.clone()),
        Box::new(HEADER_CLIENT_REQUEST_DURATION.clone()),
        Box::new(HEADER_EXCHANGE_BYTES.clone()),
        // Errors
        Box::new(SUBSYSTEM_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: &REGISTRY,
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
    ($histogram:expr, $labels:expr) => {
        $crate::HistogramTimer::new(&$histogram.with_label_values($labels))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_counter_increment() {
        HEADER_SERVER_REQUESTS
            .with_label_values(&["head", "found"])
            .inc();
        assert!(
            HEADER_SERVER_REQUESTS
                .with_label_values(&["head", "found"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_gauge_set() {
        HEADER_SERVER_STREAMS_IN_FLIGHT.set(3.0);
        assert_eq!(HEADER_SERVER_STREAMS_IN_FLIGHT.get(), 3.0);
        HEADER_SERVER_STREAMS_IN_FLIGHT.set(0.0);
    }

    #[test]
    fn test_encoded_output_names_registered_metric() {
        let handle = register_metrics().unwrap();
        HEADER_SERVER_STREAMS_REJECTED.inc();
        let text = handle.gather().unwrap();
        assert!(text.contains("qc_header_exchange_server_streams_rejected_total"));
    }

    #[test]
    fn test_histogram_timer() {
        {
            let _timer = time_histogram!(HEADER_CLIENT_REQUEST_DURATION, &["test"]);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(
            HEADER_CLIENT_REQUEST_DURATION
                .with_label_values(&["test"])
                .get_sample_count(),
            1
        );
    }
}
