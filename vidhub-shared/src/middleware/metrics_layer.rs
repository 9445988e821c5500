use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS: &str = "http_requests_total";
const HTTP_DURATION: &str = "http_request_duration_seconds";

/// Route label for a request. Requests that matched no route share one label.
fn route_label(matched: Option<&str>) -> String {
    matched.unwrap_or("unmatched").to_string()
}

/// Per-route request count and latency. Mount with `route_layer` so the
/// matched route template is available.
pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = route_label(matched_path.as_ref().map(MatchedPath::as_str));

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("route", route),
        ("status", response.status().as_u16().to_string()),
    ];

    counter!(HTTP_REQUESTS, &labels).increment(1);
    histogram!(HTTP_DURATION, &labels).record(start.elapsed().as_secs_f64());

    response
}

/// Install the Prometheus recorder and register help text for the HTTP
/// metrics plus the service's own `(name, help)` counters.
pub fn init_metrics(counters: &[(&'static str, &'static str)]) -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS, "HTTP requests by method, route and status");
    describe_histogram!(HTTP_DURATION, Unit::Seconds, "HTTP request latency by method, route and status");
    for &(name, help) in counters {
        describe_counter!(name, help);
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_routes_keep_their_template() {
        assert_eq!(route_label(Some("/notifications/:id/read")), "/notifications/:id/read");
    }

    #[test]
    fn unmatched_requests_share_a_label() {
        assert_eq!(route_label(None), "unmatched");
    }
}
