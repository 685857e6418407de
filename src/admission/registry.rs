//! Per-profile bucket registry.
//!
//! Owns the client-key to bucket map for one admission profile. Buckets are
//! created full on first consume; the map is bounded by `max_clients`, with
//! least-recently-touched buckets evicted once the bound is crossed.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use super::bucket::{Decision, TokenBucket};
use crate::clock::Clock;
use crate::config::{ConfigError, ProfileConfig};

pub struct BucketRegistry {
    name: String,
    profile: ProfileConfig,
    max_clients: usize,
    buckets: DashMap<String, TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl BucketRegistry {
    /// Build a registry for one profile. Rejects non-positive or non-finite
    /// capacity and refill rate.
    pub fn new(
        name: impl Into<String>,
        profile: ProfileConfig,
        max_clients: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        profile.validate(&name)?;
        Ok(Self {
            name,
            profile,
            max_clients,
            buckets: DashMap::new(),
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.profile
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Take one token for `key`, creating a full bucket on first sight.
    ///
    /// The per-key entry lock serializes concurrent callers on the same key,
    /// so parallel consumes never overdraw the bucket.
    pub fn consume(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let storage_key = self.storage_key(key);
        let decision = {
            let mut entry = self
                .buckets
                .entry(storage_key)
                .or_insert_with(|| self.new_bucket(now));
            entry.consume(now)
        };
        if self.buckets.len() > self.max_clients {
            self.evict_lru();
        }
        decision
    }

    /// Current state for `key` without spending a token. Unknown keys report
    /// full capacity and are not inserted.
    pub fn status(&self, key: &str) -> Decision {
        let now = self.clock.now();
        match self.buckets.get_mut(&self.storage_key(key)) {
            Some(mut bucket) => bucket.status(now),
            None => Decision::full(self.profile.capacity),
        }
    }

    /// Reset one key's bucket to full, or drop every bucket when `key` is
    /// `None`.
    pub fn reset(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                if let Some(mut bucket) = self.buckets.get_mut(&self.storage_key(key)) {
                    bucket.reset(self.clock.now());
                }
            }
            None => {
                let dropped = self.buckets.len();
                self.buckets.clear();
                debug!("Reset {} admission buckets for profile '{}'", dropped, self.name);
            }
        }
    }

    fn new_bucket(&self, now: Instant) -> TokenBucket {
        TokenBucket::new(self.profile.capacity, self.profile.refill_per_sec, now)
    }

    fn storage_key(&self, key: &str) -> String {
        if self.profile.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.profile.key_prefix, key)
        }
    }

    /// Drop the least-recently-touched buckets until the map is back at the
    /// bound. An evicted client simply starts over with a full bucket.
    fn evict_lru(&self) {
        let over = self.buckets.len().saturating_sub(self.max_clients);
        if over == 0 {
            return;
        }
        let mut by_age: Vec<(String, Instant)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_touch()))
            .collect();
        by_age.sort_unstable_by_key(|(_, touched)| *touched);
        for (key, _) in by_age.into_iter().take(over) {
            self.buckets.remove(&key);
        }
        debug!("Evicted {} stale buckets from profile '{}'", over, self.name);
    }
}
