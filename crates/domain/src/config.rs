//! Planner configuration: which thermostats to drive and how.
//!
//! Loaded and persisted by a `ConfigRepository` in the app layer. Every field
//! defaults so a partial document (or none at all) still yields a usable,
//! if empty, configuration.

use std::collections::HashSet;
use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::entity::OperationMode;
use crate::error::ValidationError;
use crate::schedule::ScheduleMap;

/// Top-level planner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub version: u32,
    /// Hub connection credentials.
    pub hub: HubSettings,
    /// Entity reporting the outdoor temperature as its state.
    pub external_sensor: String,
    /// Optional weather entity whose state is the current condition.
    pub weather_entity: Option<String>,
    /// IANA time zone schedules are written in.
    pub tz: String,
    pub systems: Vec<SystemConfig>,
    pub limits: TemperatureLimits,
    pub precondition: PreconditionTuning,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            hub: HubSettings::default(),
            external_sensor: String::new(),
            weather_entity: None,
            tz: "UTC".to_string(),
            systems: Vec::new(),
            limits: TemperatureLimits::default(),
            precondition: PreconditionTuning::default(),
        }
    }
}

impl PlannerConfig {
    /// Parse [`Self::tz`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTimeZone`] if the name is not a known
    /// IANA zone.
    pub fn time_zone(&self) -> Result<Tz, ValidationError> {
        self.tz
            .parse::<Tz>()
            .map_err(|_| ValidationError::UnknownTimeZone(self.tz.clone()))
    }

    /// Light sanity check; full schema validation happens upstream.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.time_zone()?;

        let mut seen = HashSet::new();
        for system in &self.systems {
            if system.thermostat_entity_id.trim().is_empty() {
                return Err(ValidationError::EmptyThermostatId);
            }
            if !seen.insert(system.thermostat_entity_id.as_str()) {
                return Err(ValidationError::DuplicateThermostat(
                    system.thermostat_entity_id.clone(),
                ));
            }
            for rule in system.heating_schedule.values().chain(system.cooling_schedule.values()).flatten() {
                if !rule.is_in_range() {
                    return Err(ValidationError::RuleOutOfRange {
                        day: rule.day,
                        minute: rule.minute,
                    });
                }
            }
        }
        Ok(())
    }

    /// Thermostat entity ids of every configured system.
    #[must_use]
    pub fn thermostat_ids(&self) -> Vec<&str> {
        self.systems
            .iter()
            .map(|s| s.thermostat_entity_id.as_str())
            .collect()
    }
}

/// Where the hub lives and how to authenticate.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub host: String,
    pub token: String,
}

impl HubSettings {
    /// Both host and token are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.token.is_empty()
    }
}

impl fmt::Debug for HubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSettings")
            .field("host", &self.host)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// One thermostat and the sensors that steer it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub thermostat_entity_id: String,
    /// The thermostat's own temperature sensor. Never considered stale.
    pub thermostat_sensor: String,
    pub temp_sensors: Vec<String>,
    pub heating_schedule: ScheduleMap,
    pub cooling_schedule: ScheduleMap,
}

impl SystemConfig {
    /// Schedule applying to `mode`: cooling for `cool`, heating otherwise.
    #[must_use]
    pub fn schedule_for(&self, mode: &OperationMode) -> &ScheduleMap {
        if mode.is_cooling() {
            &self.cooling_schedule
        } else {
            &self.heating_schedule
        }
    }
}

/// Hard temperature bounds, in the hub's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureLimits {
    pub min_temp: f64,
    pub max_temp: f64,
    /// Cooling is suspended when it is colder than this outside.
    pub lowest_outdoor_temp_for_cooling: f64,
    /// Sensors not updated for longer than this are disconnected.
    pub stale_after_minutes: i64,
}

impl Default for TemperatureLimits {
    fn default() -> Self {
        Self {
            min_temp: 50.0,
            max_temp: 90.0,
            lowest_outdoor_temp_for_cooling: 60.0,
            stale_after_minutes: 30,
        }
    }
}

impl TemperatureLimits {
    /// The setpoint that asks nothing of the equipment: the maximum when
    /// cooling, the minimum otherwise.
    #[must_use]
    pub fn sentinel(&self, mode: &OperationMode) -> f64 {
        if mode.is_cooling() {
            self.max_temp
        } else {
            self.min_temp
        }
    }

    /// Check a requested target against the bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TemperatureOutOfRange`] when `value` is not
    /// finite or falls outside `min_temp..=max_temp`.
    pub fn check(&self, value: f64) -> Result<(), ValidationError> {
        if value.is_finite() && (self.min_temp..=self.max_temp).contains(&value) {
            Ok(())
        } else {
            Err(ValidationError::TemperatureOutOfRange {
                value,
                min: self.min_temp,
                max: self.max_temp,
            })
        }
    }
}

/// Constants of the preconditioning heuristic.
///
/// Minutes needed per degree of cooling start at `base_minutes_per_degree`,
/// gain one base interval per `outdoor_temp_step` degrees above
/// `reference_outdoor_temp`, and one more when sunny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreconditionTuning {
    pub base_minutes_per_degree: f64,
    pub reference_outdoor_temp: f64,
    pub outdoor_temp_step: f64,
    pub sunny_penalty: bool,
    /// Start this many minutes before the estimate says it is needed.
    pub lead_minutes: f64,
}

impl Default for PreconditionTuning {
    fn default() -> Self {
        Self {
            base_minutes_per_degree: 20.0,
            reference_outdoor_temp: 70.0,
            outdoor_temp_step: 10.0,
            sunny_penalty: true,
            lead_minutes: 10.0,
        }
    }
}
