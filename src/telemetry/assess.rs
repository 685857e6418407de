//! Scalability assessment.
//!
//! A pure function from one metrics snapshot to a health verdict. Each
//! threshold rule that fires deducts from a starting score of 100; the
//! severe tier of a category stacks on top of its warning tier.

use serde::Serialize;

use super::collector::PerformanceMetrics;
use super::system::SystemMetrics;
use crate::db::DatabaseStats;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub status: HealthStatus,
    pub score: u8,
    pub recommendations: Vec<String>,
    pub alerts: Vec<String>,
}

pub fn assess(
    perf: &PerformanceMetrics,
    db: &DatabaseStats,
    sys: &SystemMetrics,
) -> Assessment {
    let mut score: i32 = 100;
    let mut recommendations = Vec::new();
    let mut alerts = Vec::new();

    if db.size_bytes > GIB {
        score -= 15;
        recommendations
            .push("Database exceeds 1 GiB; plan archival or a move off SQLite".to_string());
    }
    if db.size_bytes > 5 * GIB {
        score -= 30;
        alerts.push("Database exceeds 5 GiB; past SQLite's comfortable size for this workload".to_string());
    }

    if perf.response_time.p95_ms > 200.0 {
        score -= 10;
        recommendations
            .push("p95 response time above 200 ms; profile slow queries and indexes".to_string());
    }
    if perf.response_time.p95_ms > 500.0 {
        score -= 25;
        alerts.push("p95 response time above 500 ms; clients will see timeouts".to_string());
    }

    if perf.throughput.requests_per_second > 100.0 {
        score -= 5;
        recommendations
            .push("Sustained load above 100 req/s; consider caching hot reads".to_string());
    }
    if perf.throughput.requests_per_second > 500.0 {
        score -= 20;
        alerts.push("Sustained load above 500 req/s; approaching single-node limits".to_string());
    }

    if perf.errors.rate_pct > 1.0 {
        score -= 10;
        recommendations.push("Error rate above 1%; check recent changes and logs".to_string());
    }
    if perf.errors.rate_pct > 5.0 {
        score -= 25;
        alerts.push("Error rate above 5%; the service is degraded".to_string());
    }

    if sys.memory_used_pct > 80.0 {
        score -= 5;
        recommendations.push("Memory use above 80%; watch for swap pressure".to_string());
    }
    if sys.memory_used_pct > 90.0 {
        score -= 20;
        alerts.push("Memory use above 90%; host is near its limit".to_string());
    }

    let score = score.clamp(0, 100) as u8;
    let status = if score >= 80 {
        HealthStatus::Green
    } else if score >= 60 {
        HealthStatus::Yellow
    } else {
        HealthStatus::Red
    };
    Assessment {
        status,
        score,
        recommendations,
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::collector::{ErrorStats, ResponseTimeStats, ThroughputStats};

    fn perf(p95: f64, rps: f64, error_pct: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            response_time: ResponseTimeStats {
                avg_ms: p95 / 2.0,
                p95_ms: p95,
                p99_ms: p95 * 1.2,
            },
            throughput: ThroughputStats {
                requests_per_second: rps,
                requests_per_minute: rps * 60.0,
            },
            errors: ErrorStats {
                rate_pct: error_pct,
                count: 0,
            },
        }
    }

    fn db(size_bytes: u64) -> DatabaseStats {
        DatabaseStats {
            size_bytes,
            ..DatabaseStats::default()
        }
    }

    fn sys(memory_used_pct: f64) -> SystemMetrics {
        SystemMetrics {
            memory_used_pct,
            ..SystemMetrics::default()
        }
    }

    #[test]
    fn quiet_system_scores_perfect_green() {
        let verdict = assess(&perf(50.0, 10.0, 0.0), &db(1024), &sys(40.0));
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.status, HealthStatus::Green);
        assert!(verdict.recommendations.is_empty());
        assert!(verdict.alerts.is_empty());
    }

    #[test]
    fn zeroed_gauges_fire_no_rules() {
        let verdict = assess(
            &PerformanceMetrics::default(),
            &DatabaseStats::default(),
            &SystemMetrics::default(),
        );
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.status, HealthStatus::Green);
    }

    #[test]
    fn warning_tier_deducts_and_recommends() {
        let verdict = assess(&perf(300.0, 10.0, 0.0), &db(0), &sys(40.0));
        assert_eq!(verdict.score, 90);
        assert_eq!(verdict.status, HealthStatus::Green);
        assert_eq!(verdict.recommendations.len(), 1);
        assert!(verdict.alerts.is_empty());
    }

    #[test]
    fn severe_tier_stacks_on_warning_tier() {
        // p95 at 600 ms crosses both the 200 ms and 500 ms thresholds.
        let verdict = assess(&perf(600.0, 10.0, 0.0), &db(0), &sys(40.0));
        assert_eq!(verdict.score, 65);
        assert_eq!(verdict.status, HealthStatus::Yellow);
        assert_eq!(verdict.recommendations.len(), 1);
        assert_eq!(verdict.alerts.len(), 1);
    }

    #[test]
    fn database_tiers_follow_size() {
        let warn = assess(&perf(50.0, 1.0, 0.0), &db(2 * GIB), &sys(40.0));
        assert_eq!(warn.score, 85);
        let severe = assess(&perf(50.0, 1.0, 0.0), &db(6 * GIB), &sys(40.0));
        assert_eq!(severe.score, 55);
        assert_eq!(severe.status, HealthStatus::Red);
    }

    #[test]
    fn worse_inputs_never_raise_the_score() {
        let base = assess(&perf(100.0, 10.0, 0.0), &db(0), &sys(40.0));
        let degraded = assess(&perf(250.0, 10.0, 0.0), &db(0), &sys(40.0));
        let bad = assess(&perf(700.0, 10.0, 0.0), &db(0), &sys(40.0));
        assert!(base.score >= degraded.score);
        assert!(degraded.score >= bad.score);
    }

    #[test]
    fn everything_on_fire_clamps_to_zero() {
        let verdict = assess(&perf(800.0, 700.0, 10.0), &db(6 * GIB), &sys(95.0));
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.status, HealthStatus::Red);
        assert_eq!(verdict.recommendations.len(), 5);
        assert_eq!(verdict.alerts.len(), 5);
    }

    #[test]
    fn assessment_is_a_pure_function() {
        let perf = perf(600.0, 200.0, 2.0);
        let db = db(2 * GIB);
        let sys = sys(85.0);
        assert_eq!(assess(&perf, &db, &sys), assess(&perf, &db, &sys));
    }

    #[test]
    fn status_bands_split_at_80_and_60() {
        // 20 off: still green.
        let green = assess(&perf(50.0, 150.0, 0.0), &db(2 * GIB), &sys(40.0));
        assert_eq!(green.score, 80);
        assert_eq!(green.status, HealthStatus::Green);
        // 35 off: yellow.
        let yellow = assess(&perf(600.0, 10.0, 0.0), &db(0), &sys(40.0));
        assert_eq!(yellow.status, HealthStatus::Yellow);
        // 45 off: red.
        let red = assess(&perf(50.0, 1.0, 0.0), &db(6 * GIB), &sys(40.0));
        assert_eq!(red.status, HealthStatus::Red);
    }
}
