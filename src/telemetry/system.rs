//! Host and process gauges.
//!
//! Sampled fresh on every call via `sysinfo`; nothing runs in the
//! background. A failed process lookup degrades to zero rather than erroring.

use std::time::Instant;

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, System};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_free_bytes: u64,
    pub memory_used_pct: f64,
    pub process_memory_bytes: u64,
    pub uptime_secs: u64,
}

pub struct SystemSampler {
    started_at: Instant,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn sample(&self) -> SystemMetrics {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_processes_specifics(ProcessRefreshKind::new().with_memory());

        let total = sys.total_memory();
        let used = sys.used_memory();
        let process_memory = sys
            .process(Pid::from_u32(std::process::id()))
            .map(|process| process.memory())
            .unwrap_or(0);

        SystemMetrics {
            memory_total_bytes: total,
            memory_used_bytes: used,
            memory_free_bytes: sys.available_memory(),
            memory_used_pct: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            process_memory_bytes: process_memory,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}
