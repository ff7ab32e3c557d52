//! Prometheus metrics exposition.
//!
//! Registers and exposes:
//!
//! - `tileserver_http_requests_total` (counter): labels `status`, `method`
//! - `tileserver_http_request_duration_seconds` (histogram): label `status`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "tileserver_http_request_duration_seconds";

/// Install the Prometheus recorder and return a handle for rendering
/// metrics. Configures explicit histogram buckets so the duration metric
/// renders `_bucket` lines (for `histogram_quantile()`) rather than the
/// default summary.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(DURATION_METRIC.to_string()),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed HTTP request with status code and method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("tileserver_http_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Axum middleware that times a request and records it via
/// [`record_request`].
pub async fn track_request(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().to_string();
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    record_request(response.status().as_u16(), &method, start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, "GET", 0.05);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(DURATION_METRIC.to_string()),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ],
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.042);
        record_request(500, "POST", 1.5);

        let output = handle.render();
        assert!(output.contains("tileserver_http_requests_total"));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("status=\"500\""));
        assert!(output.contains("method=\"POST\""));
        assert!(output.contains("tileserver_http_request_duration_seconds_bucket"));
    }

    #[test]
    fn histogram_buckets_cover_expected_range() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"0.01\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
