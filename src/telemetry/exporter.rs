//! Prometheus text exposition.
//!
//! One constructed registry per server instance, owned by whoever serves
//! `/metrics/prometheus`. Gauges are set from a snapshot at render time;
//! nothing is global. Client keys appear only as truncated SHA-256 digests
//! so addresses never leak into the scrape.

use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use sha2::{Digest, Sha256};
use tracing::error;

use super::collector::{CollectorSummary, PerformanceMetrics};
use super::system::SystemMetrics;
use crate::db::DatabaseStats;

pub struct PromExporter {
    registry: Registry,
    requests_per_second: Gauge,
    requests_per_minute: Gauge,
    response_avg_ms: Gauge,
    response_p95_ms: Gauge,
    response_p99_ms: Gauge,
    error_rate_pct: Gauge,
    error_count: IntGauge,
    requests_total: IntGauge,
    rate_limited_total: IntGauge,
    active_clients: IntGauge,
    buffered_records: IntGauge,
    db_size_bytes: IntGauge,
    db_page_count: IntGauge,
    db_table_count: IntGauge,
    db_index_count: IntGauge,
    db_avg_query_ms: Gauge,
    memory_total_bytes: IntGauge,
    memory_used_bytes: IntGauge,
    memory_used_pct: Gauge,
    process_memory_bytes: IntGauge,
    uptime_seconds: IntGauge,
    client_requests: IntGaugeVec,
}

impl PromExporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let client_requests = IntGaugeVec::new(
            Opts::new(
                "shelfd_client_requests",
                "In-window requests per hashed client key",
            ),
            &["client"],
        )?;
        registry.register(Box::new(client_requests.clone()))?;
        Ok(Self {
            requests_per_second: gauge(
                &registry,
                "shelfd_requests_per_second",
                "Requests per second over the stats window",
            )?,
            requests_per_minute: gauge(
                &registry,
                "shelfd_requests_per_minute",
                "Requests per minute over the stats window",
            )?,
            response_avg_ms: gauge(
                &registry,
                "shelfd_response_time_avg_ms",
                "Mean response time in the stats window",
            )?,
            response_p95_ms: gauge(
                &registry,
                "shelfd_response_time_p95_ms",
                "95th percentile response time in the stats window",
            )?,
            response_p99_ms: gauge(
                &registry,
                "shelfd_response_time_p99_ms",
                "99th percentile response time in the stats window",
            )?,
            error_rate_pct: gauge(
                &registry,
                "shelfd_error_rate_pct",
                "Share of 4xx/5xx responses in the stats window",
            )?,
            error_count: int_gauge(
                &registry,
                "shelfd_error_count",
                "4xx/5xx responses in the stats window",
            )?,
            requests_total: int_gauge(
                &registry,
                "shelfd_requests_total",
                "Requests recorded since start",
            )?,
            rate_limited_total: int_gauge(
                &registry,
                "shelfd_rate_limited_total",
                "Requests answered 429 since start",
            )?,
            active_clients: int_gauge(
                &registry,
                "shelfd_active_clients",
                "Distinct client keys seen since the last prune",
            )?,
            buffered_records: int_gauge(
                &registry,
                "shelfd_buffered_records",
                "Request records currently buffered",
            )?,
            db_size_bytes: int_gauge(&registry, "shelfd_db_size_bytes", "Database file size")?,
            db_page_count: int_gauge(&registry, "shelfd_db_page_count", "Database page count")?,
            db_table_count: int_gauge(&registry, "shelfd_db_table_count", "Database table count")?,
            db_index_count: int_gauge(&registry, "shelfd_db_index_count", "Database index count")?,
            db_avg_query_ms: gauge(
                &registry,
                "shelfd_db_avg_query_ms",
                "Mean latency of the stats probe queries",
            )?,
            memory_total_bytes: int_gauge(
                &registry,
                "shelfd_memory_total_bytes",
                "Host memory total",
            )?,
            memory_used_bytes: int_gauge(
                &registry,
                "shelfd_memory_used_bytes",
                "Host memory in use",
            )?,
            memory_used_pct: gauge(
                &registry,
                "shelfd_memory_used_pct",
                "Host memory in use, percent",
            )?,
            process_memory_bytes: int_gauge(
                &registry,
                "shelfd_process_memory_bytes",
                "Resident set size of this process",
            )?,
            uptime_seconds: int_gauge(&registry, "shelfd_uptime_seconds", "Process uptime")?,
            client_requests,
            registry,
        })
    }

    /// Set every gauge from the snapshot and encode the exposition text.
    pub fn render(
        &self,
        perf: &PerformanceMetrics,
        db: &DatabaseStats,
        sys: &SystemMetrics,
        summary: &CollectorSummary,
        clients: &[(String, u64)],
    ) -> String {
        self.requests_per_second.set(perf.throughput.requests_per_second);
        self.requests_per_minute.set(perf.throughput.requests_per_minute);
        self.response_avg_ms.set(perf.response_time.avg_ms);
        self.response_p95_ms.set(perf.response_time.p95_ms);
        self.response_p99_ms.set(perf.response_time.p99_ms);
        self.error_rate_pct.set(perf.errors.rate_pct);
        self.error_count.set(perf.errors.count as i64);
        self.requests_total.set(summary.total_requests as i64);
        self.rate_limited_total.set(summary.total_rate_limited as i64);
        self.active_clients.set(summary.active_clients as i64);
        self.buffered_records.set(summary.buffered_records as i64);
        self.db_size_bytes.set(db.size_bytes as i64);
        self.db_page_count.set(db.page_count as i64);
        self.db_table_count.set(db.table_count as i64);
        self.db_index_count.set(db.index_count as i64);
        self.db_avg_query_ms.set(db.avg_query_ms);
        self.memory_total_bytes.set(sys.memory_total_bytes as i64);
        self.memory_used_bytes.set(sys.memory_used_bytes as i64);
        self.memory_used_pct.set(sys.memory_used_pct);
        self.process_memory_bytes.set(sys.process_memory_bytes as i64);
        self.uptime_seconds.set(sys.uptime_secs as i64);

        // Drop series for clients that left the window, then set the rest.
        self.client_requests.reset();
        for (key, count) in clients {
            self.client_requests
                .with_label_values(&[hash_client(key).as_str()])
                .set(*count as i64);
        }

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Truncated SHA-256 of a client key. Twelve hex chars is plenty to tell
/// clients apart on a dashboard without ever exposing an address.
pub fn hash_client(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let gauge = Gauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
