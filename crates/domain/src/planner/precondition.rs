//! Weather-aware estimate of when to start cooling ahead of a rule.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::config::PreconditionTuning;
use crate::overrides::{Override, PRECONDITION_REASON};
use crate::time::Timestamp;
use crate::weather::{WeatherCondition, WeatherData};

/// Hold a sensor at the upcoming rule's target until that rule starts.
///
/// Returned by the planner; the control loop persists it as an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionRequest {
    pub sensor: String,
    pub target_temp: f64,
    pub hold_until: Timestamp,
}

impl PreconditionRequest {
    #[must_use]
    pub fn into_override(self) -> Override {
        Override::new(self.sensor, self.target_temp, PRECONDITION_REASON, self.hold_until)
    }
}

/// Estimated minutes to cool one degree under `weather`.
#[must_use]
pub fn minutes_per_degree(tuning: &PreconditionTuning, weather: &WeatherData) -> f64 {
    let base = tuning.base_minutes_per_degree;
    let mut minutes = base;

    let above = weather.external_temperature - tuning.reference_outdoor_temp;
    if above > 0.0 && tuning.outdoor_temp_step > 0.0 {
        minutes += base * (above / tuning.outdoor_temp_step).floor();
    }
    if tuning.sunny_penalty && weather.condition == WeatherCondition::Sunny {
        minutes += base;
    }
    minutes
}

/// Whether cooling `degrees` must start now to be done within `remaining`.
///
/// `degrees` is how far the sensor sits above the upcoming target; nothing
/// is needed when it is not positive.
#[must_use]
pub fn needs_precondition(
    tuning: &PreconditionTuning,
    weather: &WeatherData,
    degrees: f64,
    remaining: TimeDelta,
) -> bool {
    if degrees <= 0.0 {
        return false;
    }

    #[allow(clippy::cast_precision_loss)]
    let minutes_left = remaining.num_minutes() as f64;
    let required = degrees * minutes_per_degree(tuning, weather);
    minutes_left - required < tuning.lead_minutes
}
