//! Rolling request metrics.
//!
//! Every request outcome lands here as a `RequestRecord` in a bounded
//! ring. Statistics are computed on demand over a trailing window; nothing
//! is aggregated eagerly, so an idle collector costs two atomic loads.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashSet;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::config::TelemetryConfig;

/// Most distinct client series exposed to the prometheus exporter.
const MAX_CLIENT_SERIES: usize = 100;

#[derive(Debug, Clone)]
struct RequestRecord {
    recorded_at: Instant,
    elapsed_ms: f64,
    status: u16,
    client_key: Option<String>,
}

/// Window statistics as served by the ops endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub response_time: ResponseTimeStats,
    pub throughput: ThroughputStats,
    pub errors: ErrorStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseTimeStats {
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub requests_per_second: f64,
    pub requests_per_minute: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub rate_pct: f64,
    pub count: u64,
}

/// Lifetime counters and buffer occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSummary {
    pub buffered_records: usize,
    pub active_clients: usize,
    pub total_requests: u64,
    pub total_rate_limited: u64,
}

pub struct MetricsCollector {
    records: RwLock<VecDeque<RequestRecord>>,
    active_clients: DashSet<String>,
    max_records: usize,
    active_clients_cap: usize,
    total_requests: AtomicU64,
    total_rate_limited: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MetricsCollector {
    pub fn new(config: &TelemetryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(config.max_records.min(1024))),
            active_clients: DashSet::new(),
            max_records: config.max_records,
            active_clients_cap: config.active_clients_cap,
            total_requests: AtomicU64::new(0),
            total_rate_limited: AtomicU64::new(0),
            clock,
        }
    }

    /// Append one request outcome. When the buffer crosses its cap the
    /// oldest half is discarded in one drain, keeping temporal order.
    pub fn record_request(&self, elapsed_ms: f64, status: u16, client_key: Option<&str>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status == 429 {
            self.total_rate_limited.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(key) = client_key {
            self.active_clients.insert(key.to_string());
            if self.active_clients.len() > self.active_clients_cap {
                let dropped = self.active_clients.len();
                self.active_clients.clear();
                debug!("Active client set exceeded {}, cleared {} keys", self.active_clients_cap, dropped);
            }
        }

        let record = RequestRecord {
            recorded_at: self.clock.now(),
            elapsed_ms,
            status,
            client_key: client_key.map(str::to_string),
        };
        let mut records = self.records.write();
        records.push_back(record);
        if records.len() > self.max_records {
            let drop_count = records.len() / 2;
            records.drain(..drop_count);
            debug!("Compacted request records, dropped oldest {}", drop_count);
        }
    }

    /// Statistics over the trailing `window`. An empty window yields the
    /// all-zero struct; nothing here divides by a count or a zero duration.
    pub fn performance(&self, window: Duration) -> PerformanceMetrics {
        let now = self.clock.now();
        let mut samples: Vec<f64> = Vec::new();
        let mut error_count = 0u64;
        {
            let records = self.records.read();
            // Records are appended in time order; walk from the newest and
            // stop at the first one outside the window.
            for record in records.iter().rev() {
                if now.saturating_duration_since(record.recorded_at) > window {
                    break;
                }
                samples.push(record.elapsed_ms);
                if record.status >= 400 {
                    error_count += 1;
                }
            }
        }
        if samples.is_empty() {
            return PerformanceMetrics::default();
        }

        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        samples.sort_by(f64::total_cmp);
        let window_secs = window.as_secs_f64();
        let per_second = if window_secs > 0.0 {
            count as f64 / window_secs
        } else {
            0.0
        };
        PerformanceMetrics {
            response_time: ResponseTimeStats {
                avg_ms: sum / count as f64,
                p95_ms: percentile(&samples, 0.95),
                p99_ms: percentile(&samples, 0.99),
            },
            throughput: ThroughputStats {
                requests_per_second: per_second,
                requests_per_minute: per_second * 60.0,
            },
            errors: ErrorStats {
                rate_pct: error_count as f64 / count as f64 * 100.0,
                count: error_count,
            },
        }
    }

    /// In-window request counts per client key, busiest first, capped so the
    /// exporter never emits unbounded label cardinality.
    pub fn client_request_counts(&self, window: Duration) -> Vec<(String, u64)> {
        let now = self.clock.now();
        let mut counts: HashMap<String, u64> = HashMap::new();
        {
            let records = self.records.read();
            for record in records.iter().rev() {
                if now.saturating_duration_since(record.recorded_at) > window {
                    break;
                }
                if let Some(key) = &record.client_key {
                    *counts.entry(key.clone()).or_insert(0) += 1;
                }
            }
        }
        let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(MAX_CLIENT_SERIES);
        counts
    }

    pub fn summary(&self) -> CollectorSummary {
        CollectorSummary {
            buffered_records: self.records.read().len(),
            active_clients: self.active_clients.len(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_rate_limited: self.total_rate_limited.load(Ordering::Relaxed),
        }
    }

    /// Maintenance hook: the active-client set is advisory, so it is cleared
    /// coarsely on a timer instead of tracking per-key recency.
    pub fn prune_active_clients(&self) {
        let dropped = self.active_clients.len();
        self.active_clients.clear();
        if dropped > 0 {
            debug!("Pruned {} active client keys", dropped);
        }
    }

    /// Drop all records and counters. Admin endpoint and tests only.
    pub fn reset(&self) {
        self.records.write().clear();
        self.active_clients.clear();
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_rate_limited.store(0, Ordering::Relaxed);
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (sorted.len() as f64 * q).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
