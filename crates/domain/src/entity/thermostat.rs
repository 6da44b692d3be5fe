//! Typed view over a climate entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EntityState;
use crate::error::MissingStateError;

/// Operating mode reported as the climate entity's state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationMode {
    Off,
    Heat,
    Cool,
    /// Any other hub mode (`heat_cool`, `auto`, `dry`, …).
    Other(String),
}

impl OperationMode {
    /// Whether the planner actively drives the setpoint in this mode.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Heat | Self::Cool)
    }

    #[must_use]
    pub fn is_cooling(&self) -> bool {
        matches!(self, Self::Cool)
    }
}

impl From<&str> for OperationMode {
    fn from(s: &str) -> Self {
        match s {
            "off" => Self::Off,
            "heat" => Self::Heat,
            "cool" => Self::Cool,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for OperationMode {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<OperationMode> for String {
    fn from(mode: OperationMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Heat => f.write_str("heat"),
            Self::Cool => f.write_str("cool"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// What the HVAC equipment is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HvacAction {
    Off,
    Cooling,
    Heating,
    Idle,
    Other(String),
}

impl From<&str> for HvacAction {
    fn from(s: &str) -> Self {
        match s {
            "off" => Self::Off,
            "cooling" => Self::Cooling,
            "heating" => Self::Heating,
            "idle" => Self::Idle,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for HvacAction {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<HvacAction> for String {
    fn from(action: HvacAction) -> Self {
        action.to_string()
    }
}

impl fmt::Display for HvacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Cooling => f.write_str("cooling"),
            Self::Heating => f.write_str("heating"),
            Self::Idle => f.write_str("idle"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// The parts of a climate entity the planner relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatReading {
    pub mode: OperationMode,
    /// Temperature measured by the thermostat itself.
    pub current_temperature: f64,
    /// Setpoint currently commanded on the device.
    pub setpoint: Option<f64>,
    pub fan_on: bool,
    pub hvac_action: HvacAction,
}

impl ThermostatReading {
    /// Extract a reading from a climate entity.
    ///
    /// # Errors
    ///
    /// Returns [`MissingStateError::Attribute`] when `current_temperature`
    /// is absent or not numeric.
    pub fn from_entity(entity: &EntityState) -> Result<Self, MissingStateError> {
        let current_temperature = entity
            .attribute_f64("current_temperature")
            .ok_or_else(|| MissingStateError::Attribute {
                entity_id: entity.entity_id.clone(),
                attribute: "current_temperature",
            })?;

        Ok(Self {
            mode: OperationMode::from(entity.state.as_str()),
            current_temperature,
            setpoint: entity.attribute_f64("temperature"),
            fan_on: entity.attribute_str("fan_mode") == Some("on"),
            hvac_action: HvacAction::from(entity.attribute_str("hvac_action").unwrap_or("off")),
        })
    }
}
