//! Temporary holds that supersede a sensor's schedule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Reason reserved for holds created ahead of a scheduled change.
pub const PRECONDITION_REASON: &str = "Preconditioning";

/// Reason used for holds created by a person.
pub const USER_OVERRIDE_REASON: &str = "User Override";

/// Active override per sensor entity id. At most one per sensor.
pub type OverrideMap = BTreeMap<String, Override>;

/// A hold on one sensor's target until `hold_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub sensor: String,
    pub target_temp: f64,
    pub reason: String,
    pub hold_until: Timestamp,
}

impl Override {
    #[must_use]
    pub fn new(
        sensor: impl Into<String>,
        target_temp: f64,
        reason: impl Into<String>,
        hold_until: Timestamp,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            target_temp,
            reason: reason.into(),
            hold_until,
        }
    }

    /// Whether the hold is still in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.hold_until > now
    }

    /// Whether the planner created this hold to reach an upcoming rule in time.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        self.reason == PRECONDITION_REASON
    }

    /// Label shown on the sensor while the hold is in force.
    #[must_use]
    pub fn label(&self) -> String {
        if self.is_precondition() {
            PRECONDITION_REASON.to_string()
        } else {
            format!("Override: {}", self.reason)
        }
    }
}
