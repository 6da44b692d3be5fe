//! Per-tick snapshots produced by the planner.
//!
//! Snapshots are plain values. The control loop replaces a system's snapshot
//! wholesale every tick and compares it with [`SystemState::same_as`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{HvacAction, OperationMode};
use crate::time::Timestamp;

/// How a sensor's target was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Schedule,
    Override,
    /// Held at the next rule's target ahead of its start.
    Future,
    Protection,
    Off,
    Disconnected,
}

impl RuleType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Override => "override",
            Self::Future => "future",
            Self::Protection => "protection",
            Self::Off => "off",
            Self::Disconnected => "disconnected",
        }
    }

    /// Display label used for statuses that carry no rule of their own.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Schedule => "Schedule",
            Self::Override => "Override",
            Self::Future => "Future",
            Self::Protection => "Protection",
            Self::Off => "Off",
            Self::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the HVAC would have to do for a sensor to reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionNeeded {
    None,
    Heat,
    Cool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub id: String,
    pub label: String,
    pub last_measured_at: Timestamp,
    /// `None` when the sensor's state is not numeric.
    pub current_temp: Option<f64>,
    pub rule_type: RuleType,
    pub rule_label: String,
    pub rule_temp: f64,
    pub rule_ends_at: Timestamp,
    pub desired_thermostat_setting: f64,
    pub action_needed: ActionNeeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermostatStatus {
    /// Setpoint currently commanded on the device.
    pub target_temp: Option<f64>,
    pub target_temp_type: OperationMode,
    pub functional_current_temp: f64,
    /// Sensor driving the decision, if any beats the sentinel.
    pub active_sensor: Option<String>,
    pub thermostat_sensor: String,
    pub fan_on: bool,
    pub hvac_action: HvacAction,
    pub last_changed: Timestamp,
}

/// Everything computed for one thermostat in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub sensor_statuses: Vec<SensorStatus>,
    pub thermostat_status: ThermostatStatus,
}

impl SystemState {
    /// Equality ignoring the informational `last_changed` timestamp.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        let a = &self.thermostat_status;
        let b = &other.thermostat_status;
        self.sensor_statuses == other.sensor_statuses
            && a.target_temp == b.target_temp
            && a.target_temp_type == b.target_temp_type
            && a.functional_current_temp == b.functional_current_temp
            && a.active_sensor == b.active_sensor
            && a.thermostat_sensor == b.thermostat_sensor
            && a.fan_on == b.fan_on
            && a.hvac_action == b.hvac_action
    }
}

/// Latest state per thermostat entity id.
pub type SystemStates = BTreeMap<String, SystemState>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use crate::time::now;

    fn state() -> SystemState {
        let t = now();
        SystemState {
            sensor_statuses: vec![SensorStatus {
                id: "sensor.a".to_string(),
                label: "A".to_string(),
                last_measured_at: t,
                current_temp: Some(71.0),
                rule_type: RuleType::Schedule,
                rule_label: "Day".to_string(),
                rule_temp: 70.0,
                rule_ends_at: t,
                desired_thermostat_setting: 71.0,
                action_needed: ActionNeeded::Cool,
            }],
            thermostat_status: ThermostatStatus {
                target_temp: Some(72.0),
                target_temp_type: OperationMode::Cool,
                functional_current_temp: 72.0,
                active_sensor: Some("sensor.a".to_string()),
                thermostat_sensor: "sensor.t".to_string(),
                fan_on: false,
                hvac_action: HvacAction::Idle,
                last_changed: t,
            },
        }
    }

    #[test]
    fn should_ignore_last_changed_when_comparing() {
        let a = state();
        let mut b = a.clone();
        b.thermostat_status.last_changed += TimeDelta::seconds(30);
        assert!(a.same_as(&b));
    }

    #[test]
    fn should_detect_sensor_changes() {
        let a = state();
        let mut b = a.clone();
        b.sensor_statuses[0].action_needed = ActionNeeded::None;
        assert!(!a.same_as(&b));
    }

    #[test]
    fn should_serialize_rule_type_lowercase() {
        assert_eq!(serde_json::to_string(&RuleType::Disconnected).unwrap(), "\"disconnected\"");
        assert_eq!(RuleType::Protection.title(), "Protection");
    }
}
