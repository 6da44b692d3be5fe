//! In-memory [`OverrideRepository`].
//!
//! Overrides are short-lived holds, so the daemon keeps them in memory; a
//! restart simply returns every sensor to its schedule.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use zoneplan_domain::error::ZoneplanError;
use zoneplan_domain::overrides::{Override, OverrideMap};
use zoneplan_domain::time::Timestamp;

use crate::ports::OverrideRepository;

#[derive(Debug, Default)]
pub struct InMemoryOverrideRepository {
    store: Mutex<OverrideMap>,
}

impl InMemoryOverrideRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut OverrideMap) -> T) -> T {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }
}

impl OverrideRepository for InMemoryOverrideRepository {
    fn get_all(&self) -> impl Future<Output = Result<OverrideMap, ZoneplanError>> + Send {
        let result = self.with_store(|store| store.clone());
        async { Ok(result) }
    }

    fn upsert(&self, o: Override) -> impl Future<Output = Result<Override, ZoneplanError>> + Send {
        self.with_store(|store| store.insert(o.sensor.clone(), o.clone()));
        async { Ok(o) }
    }

    fn delete(&self, sensor: &str) -> impl Future<Output = Result<(), ZoneplanError>> + Send {
        self.with_store(|store| store.remove(sensor));
        async { Ok(()) }
    }

    fn delete_expired(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<usize, ZoneplanError>> + Send {
        let removed = self.with_store(|store| {
            let before = store.len();
            store.retain(|_, o| o.is_active(now));
            before - store.len()
        });
        async move { Ok(removed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use zoneplan_domain::overrides::USER_OVERRIDE_REASON;
    use zoneplan_domain::time::now;

    fn hold(sensor: &str, temp: f64, until: Timestamp) -> Override {
        Override::new(sensor, temp, USER_OVERRIDE_REASON, until)
    }

    #[tokio::test]
    async fn should_keep_one_override_per_sensor() {
        let repo = InMemoryOverrideRepository::new();
        let until = now() + TimeDelta::hours(1);
        repo.upsert(hold("sensor.a", 68.0, until)).await.unwrap();
        repo.upsert(hold("sensor.a", 70.0, until)).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!((all["sensor.a"].target_temp - 70.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn should_delete_by_sensor() {
        let repo = InMemoryOverrideRepository::new();
        repo.upsert(hold("sensor.a", 68.0, now() + TimeDelta::hours(1)))
            .await
            .unwrap();
        repo.delete("sensor.a").await.unwrap();
        repo.delete("sensor.missing").await.unwrap();
        assert!(repo.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_purge_only_expired_overrides() {
        let repo = InMemoryOverrideRepository::new();
        let t = now();
        repo.upsert(hold("sensor.old", 68.0, t - TimeDelta::seconds(1)))
            .await
            .unwrap();
        repo.upsert(hold("sensor.new", 68.0, t + TimeDelta::hours(1)))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired(t).await.unwrap(), 1);
        let all = repo.get_all().await.unwrap();
        assert!(all.contains_key("sensor.new"));
        assert!(!all.contains_key("sensor.old"));
    }
}
