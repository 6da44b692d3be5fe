//! Last computed state per thermostat, with publish/subscribe.
//!
//! The control loop is the only writer. Every change publishes the full
//! [`SystemStates`] map on a tokio [`broadcast`] channel; publishing succeeds
//! even when there are no subscribers.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use zoneplan_domain::status::{SystemState, SystemStates};

pub struct SystemStateStore {
    states: RwLock<SystemStates>,
    sender: broadcast::Sender<Arc<SystemStates>>,
}

impl SystemStateStore {
    /// Create an empty store whose subscribers buffer up to `capacity` updates.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            states: RwLock::new(SystemStates::new()),
            sender,
        }
    }

    /// Copy of every system's latest state.
    #[must_use]
    pub fn snapshot(&self) -> SystemStates {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest state of one thermostat.
    #[must_use]
    pub fn get(&self, thermostat: &str) -> Option<SystemState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thermostat)
            .cloned()
    }

    /// Store `state` for `thermostat` and publish if it differs from the
    /// previous one, ignoring `last_changed`. Returns whether it changed.
    pub fn update(&self, thermostat: &str, state: SystemState) -> bool {
        let published = {
            let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
            let changed = states
                .get(thermostat)
                .is_none_or(|previous| !previous.same_as(&state));
            states.insert(thermostat.to_string(), state);
            changed.then(|| Arc::new(states.clone()))
        };

        let Some(states) = published else {
            return false;
        };
        tracing::debug!(%thermostat, "system state updated");
        let _ = self.sender.send(states);
        true
    }

    /// Drop states of thermostats that are no longer configured.
    pub fn retain(&self, thermostats: &[&str]) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        states.retain(|id, _| {
            let keep = thermostats.contains(&id.as_str());
            if !keep {
                tracing::debug!(thermostat = %id, "dropping state of unconfigured system");
            }
            keep
        });
    }

    /// Receive the full state map after every change from now on.
    #[must_use]
    pub fn subscribe(&self) -> StateSubscription {
        StateSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for SystemStateStore {
    fn default() -> Self {
        Self::new(16)
    }
}

/// A live subscription to [`SystemStateStore`] changes.
///
/// Dropping the subscription unsubscribes.
pub struct StateSubscription {
    receiver: broadcast::Receiver<Arc<SystemStates>>,
}

impl StateSubscription {
    /// Wait for the next change.
    ///
    /// A subscriber that falls behind skips the maps it missed.
    /// Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Arc<SystemStates>> {
        loop {
            match self.receiver.recv().await {
                Ok(states) => return Some(states),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "state subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving updates.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use zoneplan_domain::entity::{HvacAction, OperationMode};
    use zoneplan_domain::status::ThermostatStatus;
    use zoneplan_domain::time::now;

    fn state(target: f64) -> SystemState {
        SystemState {
            sensor_statuses: Vec::new(),
            thermostat_status: ThermostatStatus {
                target_temp: Some(target),
                target_temp_type: OperationMode::Heat,
                functional_current_temp: 68.0,
                active_sensor: None,
                thermostat_sensor: "sensor.hall".to_string(),
                fan_on: false,
                hvac_action: HvacAction::Heating,
                last_changed: now(),
            },
        }
    }

    #[tokio::test]
    async fn should_publish_first_state() {
        let store = SystemStateStore::default();
        let mut sub = store.subscribe();

        assert!(store.update("climate.hall", state(68.0)));

        let states = sub.recv().await.unwrap();
        assert!(states.contains_key("climate.hall"));
    }

    #[tokio::test]
    async fn should_not_publish_when_only_last_changed_differs() {
        let store = SystemStateStore::default();
        let first = state(68.0);
        let mut second = first.clone();
        second.thermostat_status.last_changed += TimeDelta::seconds(1);

        assert!(store.update("climate.hall", first));
        let mut sub = store.subscribe();
        assert!(!store.update("climate.hall", second.clone()));
        assert_eq!(
            store.get("climate.hall").unwrap().thermostat_status.last_changed,
            second.thermostat_status.last_changed
        );
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn should_deliver_full_map_to_every_subscriber() {
        let store = SystemStateStore::default();
        store.update("climate.up", state(66.0));
        let mut a = store.subscribe();
        let mut b = store.subscribe();

        store.update("climate.down", state(70.0));

        for sub in [&mut a, &mut b] {
            let states = sub.recv().await.unwrap();
            assert_eq!(states.len(), 2);
        }
    }

    #[test]
    fn should_prune_unconfigured_systems() {
        let store = SystemStateStore::default();
        store.update("climate.a", state(66.0));
        store.update("climate.b", state(66.0));

        store.retain(&["climate.b"]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["climate.b"]);
    }

    #[test]
    fn should_succeed_without_subscribers() {
        let store = SystemStateStore::default();
        assert!(store.update("climate.a", state(66.0)));
    }

    #[tokio::test]
    async fn should_stop_delivering_after_unsubscribe() {
        let store = SystemStateStore::default();
        let sub = store.subscribe();
        assert_eq!(store.sender.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(store.sender.receiver_count(), 0);
    }
}
