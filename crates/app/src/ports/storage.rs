//! Storage ports: persistence for overrides and the planner configuration.

use std::future::Future;
use std::sync::Arc;

use zoneplan_domain::config::PlannerConfig;
use zoneplan_domain::error::ZoneplanError;
use zoneplan_domain::overrides::{Override, OverrideMap};
use zoneplan_domain::time::Timestamp;

/// Override persistence. At most one override per sensor.
pub trait OverrideRepository: Send + Sync {
    /// All stored overrides, keyed by sensor id.
    fn get_all(&self) -> impl Future<Output = Result<OverrideMap, ZoneplanError>> + Send;

    /// Insert or replace the override for `o.sensor`.
    fn upsert(&self, o: Override) -> impl Future<Output = Result<Override, ZoneplanError>> + Send;

    /// Remove the override for `sensor`, if any.
    fn delete(&self, sensor: &str) -> impl Future<Output = Result<(), ZoneplanError>> + Send;

    /// Remove every override whose hold has ended by `now`; returns how many.
    fn delete_expired(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<usize, ZoneplanError>> + Send;
}

/// Planner configuration persistence.
pub trait ConfigRepository: Send + Sync {
    /// The stored configuration, or `None` when nothing was saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<PlannerConfig>, ZoneplanError>> + Send;

    fn save(&self, config: &PlannerConfig) -> impl Future<Output = Result<(), ZoneplanError>> + Send;
}

impl<T: OverrideRepository> OverrideRepository for Arc<T> {
    fn get_all(&self) -> impl Future<Output = Result<OverrideMap, ZoneplanError>> + Send {
        (**self).get_all()
    }

    fn upsert(&self, o: Override) -> impl Future<Output = Result<Override, ZoneplanError>> + Send {
        (**self).upsert(o)
    }

    fn delete(&self, sensor: &str) -> impl Future<Output = Result<(), ZoneplanError>> + Send {
        (**self).delete(sensor)
    }

    fn delete_expired(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<usize, ZoneplanError>> + Send {
        (**self).delete_expired(now)
    }
}

impl<T: ConfigRepository> ConfigRepository for Arc<T> {
    fn load(&self) -> impl Future<Output = Result<Option<PlannerConfig>, ZoneplanError>> + Send {
        (**self).load()
    }

    fn save(&self, config: &PlannerConfig) -> impl Future<Output = Result<(), ZoneplanError>> + Send {
        (**self).save(config)
    }
}
