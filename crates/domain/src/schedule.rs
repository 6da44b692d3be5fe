//! Weekly schedules.
//!
//! A schedule assigns each sensor a set of [`ScheduleRule`]s. A rule starts at
//! a wall-clock `(day, minute)` in the configured time zone and stays in force
//! until the next rule of the same sensor starts.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveTime, TimeDelta, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;
use crate::time::{Timestamp, resolve_local};

pub const DAYS_PER_WEEK: u8 = 7;
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Rules per sensor entity id. Entity ids are unique, stable strings.
pub type ScheduleMap = BTreeMap<String, Vec<ScheduleRule>>;

/// One weekly rule: from `day` at `minute`, aim for `temp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRule {
    /// Day of week, 0 = Sunday.
    pub day: u8,
    /// Minute of day, 0..1440.
    #[serde(alias = "time")]
    pub minute: u16,
    pub temp: f64,
    #[serde(default)]
    pub label: String,
}

impl ScheduleRule {
    #[must_use]
    pub fn new(day: u8, minute: u16, temp: f64, label: impl Into<String>) -> Self {
        Self {
            day,
            minute,
            temp,
            label: label.into(),
        }
    }

    /// Whether `day` and `minute` fall inside the weekly cycle.
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        self.day < DAYS_PER_WEEK && self.minute < MINUTES_PER_DAY
    }

    /// Next instant at or after `now` at which this rule starts.
    ///
    /// Computed in local civil time of `tz`: the target keeps the sub-second
    /// part of `now` with seconds zeroed, and a rule for today whose minute
    /// has already been reached is pushed a full week ahead.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::RuleOutOfRange`] for a rule outside the
    /// weekly cycle, and [`InvariantViolation::NegativeDelta`] if the computed
    /// instant lies before `now`.
    pub fn next_occurrence(&self, now: Timestamp, tz: Tz) -> Result<Timestamp, InvariantViolation> {
        if !self.is_in_range() {
            return Err(InvariantViolation::RuleOutOfRange {
                day: self.day,
                minute: self.minute,
            });
        }

        let local = now.with_timezone(&tz);
        let current_day = local.weekday().num_days_from_sunday();
        let current_minute = local.hour() * 60 + local.minute();

        let mut days = (i64::from(self.day) - i64::from(current_day)).rem_euclid(7);
        if days == 0 && current_minute >= u32::from(self.minute) {
            days = 7;
        }

        let time = NaiveTime::from_hms_nano_opt(
            u32::from(self.minute / 60),
            u32::from(self.minute % 60),
            0,
            local.nanosecond() % 1_000_000_000,
        )
        .ok_or(InvariantViolation::RuleOutOfRange {
            day: self.day,
            minute: self.minute,
        })?;
        let date = local.date_naive() + TimeDelta::days(days);
        let target = resolve_local(tz, date.and_time(time), now)?.to_utc();

        if target < now {
            return Err(InvariantViolation::NegativeDelta {
                day: self.day,
                minute: self.minute,
                delta_ms: (target - now).num_milliseconds(),
            });
        }
        Ok(target)
    }

    /// Time from `now` until [`Self::next_occurrence`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::next_occurrence`].
    pub fn delta(&self, now: Timestamp, tz: Tz) -> Result<TimeDelta, InvariantViolation> {
        Ok(self.next_occurrence(now, tz)? - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use chrono_tz::America::Chicago;

    fn at(iso: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(iso).unwrap().with_timezone(&Utc)
    }

    fn next(iso: &str, day: u8, minute: u16, tz: Tz) -> String {
        ScheduleRule::new(day, minute, 70.0, "rule")
            .next_occurrence(at(iso), tz)
            .unwrap()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    const NOW: &str = "2022-07-08T12:15:16.541Z";

    // ── Same weekday ──

    #[test]
    fn should_schedule_later_today() {
        assert_eq!(next(NOW, 5, 13 * 60, Chicago), "2022-07-08T18:00:00.541Z");
        assert_eq!(next(NOW, 5, 14 * 60 + 29, Chicago), "2022-07-08T19:29:00.541Z");
    }

    #[test]
    fn should_push_a_week_ahead_when_minute_already_passed() {
        assert_eq!(next(NOW, 5, 7 * 60, Chicago), "2022-07-15T12:00:00.541Z");
    }

    #[test]
    fn should_push_a_week_ahead_when_minute_is_exactly_now() {
        // 07:15 local is the current minute in Chicago.
        assert_eq!(next(NOW, 5, 7 * 60 + 15, Chicago), "2022-07-15T12:15:00.541Z");
    }

    // ── Other weekdays ──

    #[test]
    fn should_schedule_yesterday_next_week() {
        assert_eq!(next(NOW, 4, 30, Chicago), "2022-07-14T05:30:00.541Z");
    }

    #[test]
    fn should_schedule_tomorrow() {
        assert_eq!(next(NOW, 6, 30, Chicago), "2022-07-09T05:30:00.541Z");
    }

    #[test]
    fn should_schedule_sunday() {
        assert_eq!(next(NOW, 0, 30, Chicago), "2022-07-10T05:30:00.541Z");
    }

    // ── Zone boundaries ──

    #[test]
    fn should_use_local_weekday_when_utc_day_is_ahead() {
        let late = "2022-07-08T23:15:16.541Z";
        assert_eq!(next(late, 5, 20 * 60, Tz::UTC), "2022-07-15T20:00:00.541Z");
        assert_eq!(next(late, 5, 20 * 60, Chicago), "2022-07-09T01:00:00.541Z");
    }

    #[test]
    fn should_use_local_weekday_when_local_day_is_behind() {
        let early = "2022-07-08T01:15:16.541Z";
        assert_eq!(next(early, 5, 2 * 60, Tz::UTC), "2022-07-08T02:00:00.541Z");
        assert_eq!(next(early, 5, 2 * 60, Chicago), "2022-07-08T07:00:00.541Z");
    }

    #[test]
    fn should_cross_spring_forward_in_local_terms() {
        // Saturday before the 2022-03-13 change; Sunday 08:00 local is CDT.
        let sat = "2022-03-12T18:00:00Z";
        assert_eq!(next(sat, 0, 8 * 60, Chicago), "2022-03-13T13:00:00.000Z");
    }

    #[test]
    fn should_pick_the_second_pass_of_a_repeated_hour() {
        // 07:15Z is 01:15 CST, after the first 01:30 CDT has gone by.
        let second_pass = "2022-11-06T07:15:00Z";
        assert_eq!(next(second_pass, 0, 90, Chicago), "2022-11-06T07:30:00.000Z");

        let first_pass = "2022-11-06T06:15:00Z";
        assert_eq!(next(first_pass, 0, 90, Chicago), "2022-11-06T06:30:00.000Z");
    }

    #[test]
    fn should_stay_ahead_of_now_throughout_fall_back() {
        let mut now = at("2022-11-06T05:00:00Z");
        while now < at("2022-11-06T09:00:00Z") {
            for minute in 0..240 {
                let next = ScheduleRule::new(0, minute, 70.0, "")
                    .next_occurrence(now, Chicago)
                    .unwrap();
                assert!(next >= now, "{now} minute {minute}");
            }
            now += TimeDelta::minutes(5);
        }
    }

    // ── Deltas ──

    #[test]
    fn should_compute_full_week_less_seconds_for_matching_minute() {
        let now = at("2022-07-08T17:15:16.541Z");
        // 12:15 local on Friday.
        let rule = ScheduleRule::new(5, 12 * 60 + 15, 68.0, "same");
        let delta = rule.delta(now, Chicago).unwrap();
        assert_eq!(delta.num_seconds(), 7 * 24 * 3600 - 16);
    }

    #[test]
    fn should_compute_delta_for_previous_minute() {
        let now = at("2022-07-08T17:15:16.541Z");
        let rule = ScheduleRule::new(5, 12 * 60 + 14, 68.0, "prev");
        let delta = rule.delta(now, Chicago).unwrap();
        assert_eq!(delta.num_seconds(), 7 * 24 * 3600 - 60 - 16);
    }

    #[test]
    fn should_never_return_an_instant_before_now() {
        let now = at(NOW);
        for day in 0..DAYS_PER_WEEK {
            for minute in (0..MINUTES_PER_DAY).step_by(7) {
                let rule = ScheduleRule::new(day, minute, 70.0, "");
                let next = rule.next_occurrence(now, Chicago).unwrap();
                assert!(next >= now, "day {day} minute {minute}");
                assert!(next - now <= TimeDelta::days(7));
            }
        }
    }

    #[test]
    fn should_reject_rules_outside_the_week() {
        let err = ScheduleRule::new(7, 0, 70.0, "")
            .next_occurrence(at(NOW), Chicago)
            .unwrap_err();
        assert_eq!(err, InvariantViolation::RuleOutOfRange { day: 7, minute: 0 });

        let err = ScheduleRule::new(1, 1440, 70.0, "")
            .next_occurrence(at(NOW), Chicago)
            .unwrap_err();
        assert_eq!(err, InvariantViolation::RuleOutOfRange { day: 1, minute: 1440 });
    }

    #[test]
    fn should_accept_time_as_alias_for_minute() {
        let rule: ScheduleRule =
            serde_json::from_str(r#"{"day": 1, "time": 390, "temp": 68, "label": "Wake"}"#).unwrap();
        assert_eq!(rule, ScheduleRule::new(1, 390, 68.0, "Wake"));
    }
}
