//! Picking the rule in force for one sensor.

use chrono::TimeDelta;
use chrono_tz::Tz;

use crate::error::InvariantViolation;
use crate::overrides::Override;
use crate::schedule::ScheduleRule;
use crate::status::RuleType;
use crate::time::Timestamp;

/// The rule governing a sensor this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub label: String,
    pub temp: f64,
    pub rule_type: RuleType,
    /// When the next rule takes over.
    pub next_rule_starts_at: Timestamp,
}

impl RuleDecision {
    #[must_use]
    pub fn from_override(o: &Override) -> Self {
        Self {
            label: o.label(),
            temp: o.target_temp,
            rule_type: if o.is_precondition() {
                RuleType::Future
            } else {
                RuleType::Override
            },
            next_rule_starts_at: o.hold_until,
        }
    }

    #[must_use]
    pub fn from_rule(rule: &ScheduleRule, rule_type: RuleType, next_rule_starts_at: Timestamp) -> Self {
        Self {
            label: rule.label.clone(),
            temp: rule.temp,
            rule_type,
            next_rule_starts_at,
        }
    }
}

/// The rule that started most recently and the one that starts next.
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'r> {
    pub current: &'r ScheduleRule,
    pub next: &'r ScheduleRule,
    /// Time left until `next` starts.
    pub remaining: TimeDelta,
}

/// Locate `now` within the weekly cycle of `rules`.
///
/// The smallest forward delta is the next rule, the largest the current one.
/// Equal deltas fall back to `(day, minute, label, temp)` so the result does
/// not depend on rule order. Returns `None` for an empty rule set.
///
/// # Errors
///
/// Propagates any [`InvariantViolation`] from computing an occurrence.
pub fn bracket(rules: &[ScheduleRule], now: Timestamp, tz: Tz) -> Result<Option<Bracket<'_>>, InvariantViolation> {
    let mut deltas = rules
        .iter()
        .map(|rule| rule.delta(now, tz).map(|delta| (delta, rule)))
        .collect::<Result<Vec<_>, _>>()?;

    deltas.sort_by(|(da, ra), (db, rb)| {
        da.cmp(db)
            .then(ra.day.cmp(&rb.day))
            .then(ra.minute.cmp(&rb.minute))
            .then_with(|| ra.label.cmp(&rb.label))
            .then_with(|| ra.temp.total_cmp(&rb.temp))
    });

    let (Some(&(remaining, next)), Some(&(_, current))) = (deltas.first(), deltas.last()) else {
        return Ok(None);
    };
    Ok(Some(Bracket {
        current,
        next,
        remaining,
    }))
}
