use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // API Metrics
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_api_requests_total",
        "Total number of requests sent to the test backend",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "attempt_api_request_duration_seconds",
        "Test backend request duration in seconds",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]
    )
    .unwrap();

    // Attempt Metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_started_total",
        "Total number of attempt initializations",
        &["status"]
    )
    .unwrap();

    pub static ref ATTEMPTS_ACTIVE: IntGauge = register_int_gauge!(
        "attempts_active",
        "Number of attempt screens currently running"
    )
    .unwrap();

    pub static ref AUTOSAVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_autosaves_total",
        "Total number of background answer saves",
        &["status"]
    )
    .unwrap();

    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_submissions_total",
        "Total number of attempt submissions",
        &["trigger", "status"]
    )
    .unwrap();

    // Anticheat Metrics
    pub static ref VIOLATIONS_DETECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_violations_detected_total",
        "Total number of environment violations detected during attempts",
        &["violation_type"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a backend request with metrics
pub async fn track_api_request<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    API_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

/// Guard that keeps `ATTEMPTS_ACTIVE` raised while an attempt screen runs
pub struct ActiveAttemptGuard;

impl ActiveAttemptGuard {
    pub fn enter() -> Self {
        ATTEMPTS_ACTIVE.inc();
        Self
    }
}

impl Drop for ActiveAttemptGuard {
    fn drop(&mut self) {
        ATTEMPTS_ACTIVE.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = SUBMISSIONS_TOTAL
            .with_label_values(&["manual", "success"])
            .get();
    }

    #[test]
    fn test_render_metrics() {
        AUTOSAVES_TOTAL.with_label_values(&["success"]).inc();

        let result = render_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("attempt_autosaves_total"));
    }

    #[tokio::test]
    async fn track_api_request_counts_failures() {
        let before = API_REQUESTS_TOTAL
            .with_label_values(&["metrics_test", "error"])
            .get();

        let result: Result<(), &str> = track_api_request("metrics_test", async { Err("boom") }).await;

        assert!(result.is_err());
        assert!(
            API_REQUESTS_TOTAL
                .with_label_values(&["metrics_test", "error"])
                .get()
                > before
        );
    }
}
