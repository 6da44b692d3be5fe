//! Choosing the sensor that drives the thermostat.

use crate::entity::OperationMode;
use crate::status::SensorStatus;

/// Sensor with the most demanding desired setting for `mode`.
///
/// Starts from `sentinel` and keeps the lowest setting when cooling, the
/// highest otherwise. Sensors are visited in id order and only a strictly
/// better setting replaces the current pick, so ties go to the smaller id.
/// Returns `(None, sentinel)` when no sensor beats the sentinel.
#[must_use]
pub fn select_active(
    mode: &OperationMode,
    statuses: &[SensorStatus],
    sentinel: f64,
) -> (Option<String>, f64) {
    let mut ordered: Vec<&SensorStatus> = statuses.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut active: Option<&str> = None;
    let mut target = sentinel;
    for status in ordered {
        let setting = status.desired_thermostat_setting;
        let better = if mode.is_cooling() {
            setting < target
        } else {
            setting > target
        };
        if better {
            active = Some(status.id.as_str());
            target = setting;
        }
    }
    (active.map(str::to_string), target)
}
