use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Koekarte metrics
const PREFIX: &str = "koekarte";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Upload Metrics
    pub static ref UPLOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_uploads_total"), "Score uploads by outcome"),
        &["outcome"]
    ).expect("Failed to create uploads_total metric");

    pub static ref UPLOAD_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_upload_duration_seconds"),
            "Light-pass upload processing duration in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0])
    ).expect("Failed to create upload_duration_seconds metric");

    // Detailed Job Metrics
    pub static ref DETAILED_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_detailed_jobs_total"), "Detailed analysis jobs by outcome"),
        &["outcome"]
    ).expect("Failed to create detailed_jobs_total metric");

    pub static ref DETAILED_JOB_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_detailed_job_duration_seconds"),
            "Detailed analysis job duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0])
    ).expect("Failed to create detailed_job_duration_seconds metric");

    pub static ref JOBS_PENDING: Gauge = Gauge::new(
        format!("{PREFIX}_jobs_pending"),
        "Detailed analysis jobs currently pending"
    ).expect("Failed to create jobs_pending metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(UPLOADS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UPLOAD_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DETAILED_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DETAILED_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_PENDING.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record an upload outcome: accepted, already_exists, rejected, or error.
pub fn record_upload(outcome: &str, duration: Duration) {
    UPLOADS_TOTAL.with_label_values(&[outcome]).inc();
    UPLOAD_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a finished detailed job: done or failed.
pub fn record_detailed_job(outcome: &str) {
    DETAILED_JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_detailed_job_duration(seconds: f64) {
    DETAILED_JOB_DURATION_SECONDS.observe(seconds);
}

pub fn set_jobs_pending(count: usize) {
    JOBS_PENDING.set(count as f64);
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request("POST", "/v1/score/upload", 200, Duration::from_millis(50));

        let metrics = REGISTRY.gather();
        let http_metrics = metrics
            .iter()
            .find(|m| m.get_name() == "koekarte_http_requests_total");

        assert!(http_metrics.is_some(), "HTTP request metrics should exist");
    }

    #[test]
    fn test_record_upload() {
        init_metrics();

        record_upload("accepted", Duration::from_millis(300));
        record_upload("already_exists", Duration::from_millis(5));

        let metrics = REGISTRY.gather();
        let upload_metrics = metrics
            .iter()
            .find(|m| m.get_name() == "koekarte_uploads_total");

        assert!(upload_metrics.is_some(), "Upload metrics should exist");
    }

    #[test]
    fn test_record_detailed_job() {
        init_metrics();

        record_detailed_job("done");
        record_detailed_job("failed");
        observe_detailed_job_duration(1.5);

        let metrics = REGISTRY.gather();
        let job_metrics = metrics
            .iter()
            .find(|m| m.get_name() == "koekarte_detailed_jobs_total");

        assert!(job_metrics.is_some(), "Detailed job metrics should exist");
    }
}
