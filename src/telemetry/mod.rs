//! Request telemetry: collection, host gauges, assessment, exposition.

pub mod assess;
pub mod collector;
pub mod exporter;
pub mod system;

pub use assess::{Assessment, HealthStatus, assess};
pub use collector::{CollectorSummary, MetricsCollector, PerformanceMetrics};
pub use exporter::PromExporter;
pub use system::{SystemMetrics, SystemSampler};

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::admission::client_key;

/// Outermost middleware: times every request and records its outcome.
/// Sits above the admission layer so 429s are observed like any other
/// response.
pub async fn track(
    State(collector): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    collector.record_request(elapsed_ms, response.status().as_u16(), Some(&key));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::TelemetryConfig;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    fn tracked_app() -> (Router, Arc<MetricsCollector>) {
        let collector = Arc::new(MetricsCollector::new(
            &TelemetryConfig::default(),
            Arc::new(SystemClock),
        ));
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/limited", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .layer(axum::middleware::from_fn_with_state(collector.clone(), track));
        (app, collector)
    }

    #[tokio::test]
    async fn records_every_response_with_its_status() {
        let (app, collector) = tracked_app();
        for _ in 0..2 {
            let request = HttpRequest::builder()
                .uri("/ok")
                .header("x-forwarded-for", "6.6.6.6")
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }
        let limited = HttpRequest::builder()
            .uri("/limited")
            .header("x-forwarded-for", "6.6.6.6")
            .body(Body::empty())
            .unwrap();
        app.oneshot(limited).await.unwrap();

        let summary = collector.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.total_rate_limited, 1);
        assert_eq!(summary.active_clients, 1);
        let perf = collector.performance(std::time::Duration::from_secs(60));
        assert_eq!(perf.errors.count, 1);
        assert!(perf.response_time.avg_ms >= 0.0);
    }
}
