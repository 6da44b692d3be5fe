//! Override service: use-cases for temporary holds.

use zoneplan_domain::config::TemperatureLimits;
use zoneplan_domain::error::ZoneplanError;
use zoneplan_domain::overrides::{Override, OverrideMap, USER_OVERRIDE_REASON};
use zoneplan_domain::planner::PreconditionRequest;
use zoneplan_domain::status::SensorStatus;
use zoneplan_domain::time::Timestamp;

use crate::ports::OverrideRepository;

/// Application service for user and preconditioning overrides.
pub struct OverrideService<R> {
    repo: R,
}

impl<R: OverrideRepository> OverrideService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Purge expired overrides, then return the remaining ones.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn active_overrides(&self, now: Timestamp) -> Result<OverrideMap, ZoneplanError> {
        let expired = self.repo.delete_expired(now).await?;
        if expired > 0 {
            tracing::info!(expired, "expired overrides removed");
        }
        let mut overrides = self.repo.get_all().await?;
        overrides.retain(|_, o| o.is_active(now));
        Ok(overrides)
    }

    /// Hold the sensor behind `status` at `target_temp` until its current rule
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneplanError::Validation`] if `target_temp` is outside
    /// `limits`, or a storage error from the repository.
    #[tracing::instrument(skip(self, status, limits), fields(sensor = %status.id))]
    pub async fn add_override(
        &self,
        status: &SensorStatus,
        target_temp: f64,
        limits: &TemperatureLimits,
    ) -> Result<Override, ZoneplanError> {
        limits.check(target_temp)?;
        let o = Override::new(
            status.id.clone(),
            target_temp,
            USER_OVERRIDE_REASON,
            status.rule_ends_at,
        );
        self.repo.upsert(o).await
    }

    /// Drop the override for `sensor`, returning it to its schedule.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_override(&self, sensor: &str) -> Result<(), ZoneplanError> {
        self.repo.delete(sensor).await
    }

    /// Persist a preconditioning hold requested by the planner.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn apply_precondition(
        &self,
        request: PreconditionRequest,
    ) -> Result<Override, ZoneplanError> {
        tracing::info!(
            sensor = %request.sensor,
            target_temp = request.target_temp,
            hold_until = %request.hold_until,
            "preconditioning ahead of next rule"
        );
        self.repo.upsert(request.into_override()).await
    }
}
