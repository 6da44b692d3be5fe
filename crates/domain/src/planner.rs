//! Rule resolver.
//!
//! [`process_system`] turns one thermostat's readings, schedules, overrides
//! and the weather into a [`SystemState`] plus the setpoint to command. It is
//! a pure function of its inputs: `now` is injected, and the only side effect
//! it asks for comes back as [`PreconditionRequest`]s for the caller to run.
//!
//! Per sensor, the first matching case wins:
//!
//! 1. mode neither `heat` nor `cool` → `off`
//! 2. cooling while it is too cold outside → `protection`
//! 3. no rules, no numeric reading, or stale → `disconnected`
//! 4. an active override → `override` (or `future` for preconditioning)
//! 5. the next rule cannot be reached in time → `future`
//! 6. otherwise the current rule → `schedule`

mod aggregate;
mod precondition;
mod rule;

pub use aggregate::select_active;
pub use precondition::{PreconditionRequest, minutes_per_degree, needs_precondition};
pub use rule::{Bracket, RuleDecision, bracket};

use chrono::TimeDelta;
use chrono_tz::Tz;

use crate::config::{PreconditionTuning, SystemConfig, TemperatureLimits};
use crate::entity::{EntityState, OperationMode, ThermostatReading, temperature_value};
use crate::error::{InvariantViolation, ZoneplanError};
use crate::overrides::OverrideMap;
use crate::schedule::ScheduleRule;
use crate::status::{ActionNeeded, RuleType, SensorStatus, SystemState, ThermostatStatus};
use crate::time::{Timestamp, far_future};
use crate::weather::WeatherData;

/// Differences smaller than this count as "at target".
const TEMPERATURE_TOLERANCE: f64 = 0.001;

/// Everything the resolver looks at for one system.
#[derive(Debug, Clone, Copy)]
pub struct SystemInputs<'a> {
    pub system: &'a SystemConfig,
    pub thermostat: &'a EntityState,
    /// One entry per configured sensor.
    pub sensors: &'a [EntityState],
    /// Active overrides; expired entries are ignored.
    pub overrides: &'a OverrideMap,
    pub weather: &'a WeatherData,
    pub tz: Tz,
    pub limits: &'a TemperatureLimits,
    pub tuning: &'a PreconditionTuning,
    pub now: Timestamp,
}

/// Result of resolving one system.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemOutcome {
    /// Snapshot to publish. Its thermostat target is the setpoint currently
    /// commanded on the device, not `new_target`.
    pub state: SystemState,
    /// Setpoint the device should have, rounded to a whole degree.
    pub new_target: f64,
    pub preconditions: Vec<PreconditionRequest>,
    /// Sensors reported as `disconnected` because their rules could not be
    /// evaluated. The caller decides how to report them.
    pub violations: Vec<SensorViolation>,
}

/// A sensor whose rules could not be evaluated this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorViolation {
    pub sensor: String,
    pub violation: InvariantViolation,
}

/// Resolve one thermostat system.
///
/// # Errors
///
/// Returns [`ZoneplanError::MissingState`] when the thermostat has no usable
/// `current_temperature`. A sensor whose rules cannot be evaluated does not
/// fail the system; it is reported in [`SystemOutcome::violations`].
pub fn process_system(inputs: &SystemInputs<'_>) -> Result<SystemOutcome, ZoneplanError> {
    let reading = ThermostatReading::from_entity(inputs.thermostat)?;
    let mode = &reading.mode;
    let sentinel = inputs.limits.sentinel(mode);
    let mut preconditions = Vec::new();
    let mut violations = Vec::new();

    let (sensor_statuses, active_sensor, target, target_type) = if !mode.is_active() {
        let statuses: Vec<_> = inputs
            .sensors
            .iter()
            .map(|s| special_status(s, RuleType::Off, sentinel))
            .collect();
        (
            statuses,
            Some(inputs.system.thermostat_sensor.clone()),
            reading.current_temperature,
            OperationMode::Off,
        )
    } else if needs_cooling_protection(mode, inputs.weather, inputs.limits) {
        let statuses: Vec<_> = inputs
            .sensors
            .iter()
            .map(|s| special_status(s, RuleType::Protection, sentinel))
            .collect();
        let (active, target) = select_active(mode, &statuses, sentinel);
        (statuses, active, target, mode.clone())
    } else {
        let schedule = inputs.system.schedule_for(mode);
        let mut statuses = Vec::with_capacity(inputs.sensors.len());
        for sensor in inputs.sensors {
            let rules = schedule.get(&sensor.entity_id).map_or(&[][..], Vec::as_slice);
            match sensor_status(inputs, &reading, sensor, rules, sentinel) {
                Ok((status, request)) => {
                    statuses.push(status);
                    preconditions.extend(request);
                }
                Err(violation) => {
                    statuses.push(special_status(sensor, RuleType::Disconnected, sentinel));
                    violations.push(SensorViolation {
                        sensor: sensor.entity_id.clone(),
                        violation,
                    });
                }
            }
        }
        let (active, target) = select_active(mode, &statuses, sentinel);
        (statuses, active, target, mode.clone())
    };

    let thermostat_status = ThermostatStatus {
        target_temp: reading.setpoint,
        target_temp_type: target_type,
        functional_current_temp: reading.current_temperature,
        active_sensor,
        thermostat_sensor: inputs.system.thermostat_sensor.clone(),
        fan_on: reading.fan_on,
        hvac_action: reading.hvac_action.clone(),
        last_changed: inputs.now,
    };

    Ok(SystemOutcome {
        state: SystemState {
            sensor_statuses,
            thermostat_status,
        },
        new_target: temperature_value(target).round(),
        preconditions,
        violations,
    })
}

fn needs_cooling_protection(mode: &OperationMode, weather: &WeatherData, limits: &TemperatureLimits) -> bool {
    mode.is_cooling() && weather.external_temperature < limits.lowest_outdoor_temp_for_cooling
}

fn is_stale(sensor: &EntityState, thermostat_sensor: &str, now: Timestamp, limits: &TemperatureLimits) -> bool {
    if sensor.entity_id == thermostat_sensor {
        return false;
    }
    (now - sensor.last_updated).abs() > TimeDelta::minutes(limits.stale_after_minutes)
}

/// Status for sensors that have no rule of their own this tick.
fn special_status(sensor: &EntityState, rule_type: RuleType, sentinel: f64) -> SensorStatus {
    SensorStatus {
        id: sensor.entity_id.clone(),
        label: sensor.label(),
        last_measured_at: sensor.last_updated,
        current_temp: sensor.temperature(),
        rule_type,
        rule_label: rule_type.title().to_string(),
        rule_temp: sentinel,
        rule_ends_at: far_future(),
        desired_thermostat_setting: sentinel,
        action_needed: ActionNeeded::None,
    }
}

fn sensor_status(
    inputs: &SystemInputs<'_>,
    reading: &ThermostatReading,
    sensor: &EntityState,
    rules: &[ScheduleRule],
    sentinel: f64,
) -> Result<(SensorStatus, Option<PreconditionRequest>), InvariantViolation> {
    let disconnected = || Ok((special_status(sensor, RuleType::Disconnected, sentinel), None));

    let Some(current) = sensor.temperature() else {
        return disconnected();
    };
    if rules.is_empty() || is_stale(sensor, &inputs.system.thermostat_sensor, inputs.now, inputs.limits) {
        return disconnected();
    }
    let Some((decision, request)) = decide(inputs, &reading.mode, sensor, current, rules)? else {
        return disconnected();
    };

    let status = SensorStatus {
        id: sensor.entity_id.clone(),
        label: sensor.label(),
        last_measured_at: sensor.last_updated,
        current_temp: Some(current),
        rule_type: decision.rule_type,
        action_needed: action_needed(&reading.mode, current, decision.temp),
        desired_thermostat_setting: desired_setting(
            &reading.mode,
            reading.current_temperature,
            current,
            decision.temp,
        ),
        rule_label: decision.label,
        rule_temp: decision.temp,
        rule_ends_at: decision.next_rule_starts_at,
    };
    Ok((status, request))
}

/// Pick the rule for a sensor with a fresh reading and at least one rule.
fn decide(
    inputs: &SystemInputs<'_>,
    mode: &OperationMode,
    sensor: &EntityState,
    current: f64,
    rules: &[ScheduleRule],
) -> Result<Option<(RuleDecision, Option<PreconditionRequest>)>, InvariantViolation> {
    if let Some(o) = inputs
        .overrides
        .get(&sensor.entity_id)
        .filter(|o| o.is_active(inputs.now))
    {
        return Ok(Some((RuleDecision::from_override(o), None)));
    }

    let Some(b) = bracket(rules, inputs.now, inputs.tz)? else {
        return Ok(None);
    };
    let next_starts_at = inputs.now + b.remaining;

    if mode.is_cooling() && needs_precondition(inputs.tuning, inputs.weather, current - b.next.temp, b.remaining) {
        let request = PreconditionRequest {
            sensor: sensor.entity_id.clone(),
            target_temp: b.next.temp,
            hold_until: next_starts_at,
        };
        return Ok(Some((
            RuleDecision::from_rule(b.next, RuleType::Future, next_starts_at),
            Some(request),
        )));
    }

    Ok(Some((
        RuleDecision::from_rule(b.current, RuleType::Schedule, next_starts_at),
        None,
    )))
}

fn action_needed(mode: &OperationMode, current: f64, target: f64) -> ActionNeeded {
    let diff = current - target;
    if diff.abs() < TEMPERATURE_TOLERANCE {
        return ActionNeeded::None;
    }
    match mode {
        OperationMode::Cool if diff > 0.0 => ActionNeeded::Cool,
        OperationMode::Heat if diff < 0.0 => ActionNeeded::Heat,
        _ => ActionNeeded::None,
    }
}

/// Thermostat reading shifted by how far the sensor is from its target,
/// rounded away from overshoot.
fn desired_setting(mode: &OperationMode, thermostat_current: f64, sensor_current: f64, target: f64) -> f64 {
    let raw = temperature_value(thermostat_current - (sensor_current - target));
    if mode.is_cooling() { raw.floor() } else { raw.ceil() }
}
