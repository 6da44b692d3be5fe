//! Entity state: the hub's latest record for one entity.
//!
//! An [`EntityState`] is owned by the hub client cache and replaced wholesale
//! whenever the hub reports a change. Everything else only reads it.

mod thermostat;

pub use thermostat::{HvacAction, OperationMode, ThermostatReading};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{Timestamp, now};

/// Latest known state of a remote entity, as reported by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default = "now")]
    pub last_changed: Timestamp,
    #[serde(default = "now")]
    pub last_updated: Timestamp,
}

impl EntityState {
    /// Create a state record with no attributes, updated at `at`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, at: Timestamp) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: at,
            last_updated: at,
        }
    }

    /// Attach an attribute, replacing any previous value.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Raw attribute lookup.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Numeric attribute, accepting both JSON numbers and numeric strings.
    #[must_use]
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        let value = match self.attribute(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// String attribute.
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(Value::as_str)
    }

    /// The state parsed as a temperature, rounded to a tenth of a degree.
    ///
    /// Returns `None` for `unavailable`, `unknown` and other non-numeric states.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.state
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(temperature_value)
    }

    /// Human readable name: the friendly name without a trailing
    /// ` Temperature`, or the entity id when no friendly name is set.
    #[must_use]
    pub fn label(&self) -> String {
        match self.attribute_str("friendly_name") {
            Some(name) if !name.is_empty() => name
                .strip_suffix(" Temperature")
                .unwrap_or(name)
                .to_string(),
            _ => self.entity_id.clone(),
        }
    }
}

/// Round a temperature to one decimal place.
#[must_use]
pub fn temperature_value(t: f64) -> f64 {
    (t * 10.0).round() / 10.0
}
