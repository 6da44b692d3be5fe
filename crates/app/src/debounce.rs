//! De-duplication of repeated setpoint commands.

use std::collections::HashMap;

use chrono::TimeDelta;
use zoneplan_domain::time::Timestamp;

/// Suppresses a command when the same value was sent to the same entity
/// within `window`.
#[derive(Debug)]
pub struct CommandDebouncer {
    window: TimeDelta,
    last_sent: HashMap<String, (f64, Timestamp)>,
}

impl CommandDebouncer {
    #[must_use]
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Record an intent to send `value` to `entity_id` at `now`.
    ///
    /// Returns `false` when an identical command went out less than `window`
    /// ago; otherwise remembers this one and returns `true`.
    pub fn should_send(&mut self, entity_id: &str, value: f64, now: Timestamp) -> bool {
        if let Some((last_value, at)) = self.last_sent.get(entity_id)
            && (last_value - value).abs() < f64::EPSILON
            && now - *at < self.window
        {
            return false;
        }
        self.last_sent.insert(entity_id.to_string(), (value, now));
        true
    }

    /// Forget entities that are no longer configured.
    pub fn retain(&mut self, entity_ids: &[&str]) {
        self.last_sent.retain(|id, _| entity_ids.contains(&id.as_str()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

impl Default for CommandDebouncer {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(10))
    }
}
