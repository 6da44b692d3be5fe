//! Time and timestamp helpers.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::InvariantViolation;

/// UTC timestamp used for `last_changed`, `last_updated`, rule boundaries, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// The end of a rule that never ends (`off`, `protection`, `disconnected`).
#[must_use]
pub fn far_future() -> Timestamp {
    Utc.with_ymd_and_hms(2199, 12, 31, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Map a wall-clock time in `tz` onto a single instant.
///
/// Ambiguous times (clocks going back) take the earliest instant that is not
/// before `not_before`, or the later one when both are. Times that fall into
/// a gap (clocks going forward) are pushed forward by one hour.
///
/// # Errors
///
/// Returns [`InvariantViolation::NonexistentLocalTime`] if neither the time
/// nor the shifted time exists.
pub fn resolve_local(
    tz: Tz,
    local: NaiveDateTime,
    not_before: Timestamp,
) -> Result<DateTime<Tz>, InvariantViolation> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, latest) => Ok(if earliest.to_utc() >= not_before {
            earliest
        } else {
            latest
        }),
        LocalResult::None => tz
            .from_local_datetime(&(local + TimeDelta::hours(1)))
            .earliest()
            .ok_or_else(|| InvariantViolation::NonexistentLocalTime {
                local: local.to_string(),
            }),
    }
}
