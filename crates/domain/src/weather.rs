//! Outdoor conditions fed to the planner.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outdoor temperature assumed when the external sensor has no reading.
pub const DEFAULT_EXTERNAL_TEMPERATURE: f64 = 70.0;

/// Categorical weather condition, as reported by the hub's weather entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WeatherCondition {
    ClearNight,
    Cloudy,
    Exceptional,
    Fog,
    Hail,
    Lightning,
    LightningRainy,
    PartlyCloudy,
    Pouring,
    Rainy,
    Snowy,
    SnowyRainy,
    Sunny,
    Windy,
    WindyVariant,
    Unknown,
}

impl WeatherCondition {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearNight => "clear-night",
            Self::Cloudy => "cloudy",
            Self::Exceptional => "exceptional",
            Self::Fog => "fog",
            Self::Hail => "hail",
            Self::Lightning => "lightning",
            Self::LightningRainy => "lightning-rainy",
            Self::PartlyCloudy => "partlycloudy",
            Self::Pouring => "pouring",
            Self::Rainy => "rainy",
            Self::Snowy => "snowy",
            Self::SnowyRainy => "snowy-rainy",
            Self::Sunny => "sunny",
            Self::Windy => "windy",
            Self::WindyVariant => "windy-variant",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for WeatherCondition {
    fn from(s: &str) -> Self {
        match s {
            "clear-night" => Self::ClearNight,
            "cloudy" => Self::Cloudy,
            "exceptional" => Self::Exceptional,
            "fog" => Self::Fog,
            "hail" => Self::Hail,
            "lightning" => Self::Lightning,
            "lightning-rainy" => Self::LightningRainy,
            "partlycloudy" => Self::PartlyCloudy,
            "pouring" => Self::Pouring,
            "rainy" => Self::Rainy,
            "snowy" => Self::Snowy,
            "snowy-rainy" => Self::SnowyRainy,
            "sunny" => Self::Sunny,
            "windy" => Self::Windy,
            "windy-variant" => Self::WindyVariant,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for WeatherCondition {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<WeatherCondition> for String {
    fn from(c: WeatherCondition) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outdoor temperature and condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub external_temperature: f64,
    pub condition: WeatherCondition,
}

impl WeatherData {
    #[must_use]
    pub fn new(external_temperature: f64, condition: WeatherCondition) -> Self {
        Self {
            external_temperature,
            condition,
        }
    }
}

impl Default for WeatherData {
    fn default() -> Self {
        Self::new(DEFAULT_EXTERNAL_TEMPERATURE, WeatherCondition::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_hub_condition_names() {
        assert_eq!(WeatherCondition::from("sunny"), WeatherCondition::Sunny);
        assert_eq!(WeatherCondition::from("clear-night"), WeatherCondition::ClearNight);
        assert_eq!(WeatherCondition::from("partlycloudy"), WeatherCondition::PartlyCloudy);
    }

    #[test]
    fn should_map_unrecognised_conditions_to_unknown() {
        assert_eq!(WeatherCondition::from("unavailable"), WeatherCondition::Unknown);
        assert_eq!(WeatherCondition::from(""), WeatherCondition::Unknown);
    }

    #[test]
    fn should_default_to_seventy_degrees_and_unknown() {
        let w = WeatherData::default();
        assert!((w.external_temperature - 70.0).abs() < f64::EPSILON);
        assert_eq!(w.condition, WeatherCondition::Unknown);
    }
}
