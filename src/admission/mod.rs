//! Request admission control.
//!
//! A token bucket per client key, grouped into named profiles (`standard`
//! for reads, `write` for mutations, plus whatever the config adds). The
//! axum middleware in [`middleware`] consults these and answers 429 when a
//! client has spent its burst.

pub mod bucket;
pub mod middleware;
pub mod registry;

pub use bucket::{Decision, TokenBucket};
pub use middleware::{AdmissionState, KeyError, admit, client_key};
pub use registry::BucketRegistry;

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{AdmissionConfig, ConfigError};

/// All configured profile registries, sharing one clock.
pub struct AdmissionControl {
    profiles: HashMap<String, Arc<BucketRegistry>>,
}

impl AdmissionControl {
    /// Build one registry per configured profile. Bad profile numbers are
    /// fatal here, before the server accepts traffic.
    pub fn from_config(
        config: &AdmissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let mut profiles = HashMap::new();
        for (name, profile) in &config.profiles {
            let registry = BucketRegistry::new(
                name.clone(),
                profile.clone(),
                config.max_clients,
                clock.clone(),
            )?;
            profiles.insert(name.clone(), Arc::new(registry));
        }
        Ok(Self { profiles })
    }

    pub fn profile(&self, name: &str) -> Option<&Arc<BucketRegistry>> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<BucketRegistry>> {
        self.profiles.values()
    }

    /// Total tracked client keys across profiles.
    pub fn tracked_clients(&self) -> usize {
        self.profiles.values().map(|r| r.tracked_clients()).sum()
    }

    /// Drop every bucket in every profile.
    pub fn reset_all(&self) {
        for registry in self.profiles.values() {
            registry.reset(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ProfileConfig;

    fn control() -> AdmissionControl {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new());
        AdmissionControl::from_config(&AdmissionConfig::default(), clock).unwrap()
    }

    #[test]
    fn builds_default_profiles() {
        let control = control();
        assert!(control.profile("standard").is_some());
        assert!(control.profile("write").is_some());
        assert!(control.profile("absent").is_none());
    }

    #[test]
    fn same_client_has_independent_budgets_per_profile() {
        let control = control();
        let standard = control.profile("standard").unwrap();
        let write = control.profile("write").unwrap();
        for _ in 0..20 {
            write.consume("1.2.3.4");
        }
        assert!(!write.consume("1.2.3.4").allowed);
        assert!(standard.consume("1.2.3.4").allowed);
    }

    #[test]
    fn rejects_invalid_profile_at_construction() {
        let mut config = AdmissionConfig::default();
        config.profiles.insert(
            "broken".into(),
            ProfileConfig {
                capacity: -5.0,
                refill_per_sec: 1.0,
                key_prefix: String::new(),
            },
        );
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new());
        assert!(AdmissionControl::from_config(&config, clock).is_err());
    }

    #[test]
    fn reset_all_clears_every_profile() {
        let control = control();
        control.profile("standard").unwrap().consume("a");
        control.profile("write").unwrap().consume("a");
        assert_eq!(control.tracked_clients(), 2);
        control.reset_all();
        assert_eq!(control.tracked_clients(), 0);
    }
}
