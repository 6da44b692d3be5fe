//! Control loop: resolves every configured system on a fixed cadence.
//!
//! Each tick reads the latest configuration, gathers cached entity states
//! from the hub, runs the planner per system, stores the result and, when the
//! device setpoint is behind, commands the new one. Systems are processed one
//! after the other; a failing system is logged and skipped, and no error ever
//! stops the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use zoneplan_domain::config::{PlannerConfig, SystemConfig};
use zoneplan_domain::entity::EntityState;
use zoneplan_domain::error::{MissingStateError, ZoneplanError};
use zoneplan_domain::overrides::OverrideMap;
use zoneplan_domain::planner::{self, PreconditionRequest, SystemInputs};
use zoneplan_domain::time::{Timestamp, now};
use zoneplan_domain::weather::{DEFAULT_EXTERNAL_TEMPERATURE, WeatherCondition, WeatherData};

use crate::debounce::CommandDebouncer;
use crate::ports::{HubClient, OverrideRepository};
use crate::services::override_service::OverrideService;
use crate::system_state::SystemStateStore;

/// A setpoint sent to a thermostat.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointCommand {
    pub entity_id: String,
    pub temperature: f64,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Thermostats resolved successfully.
    pub processed: Vec<String>,
    /// Thermostats skipped because of an error.
    pub skipped: Vec<String>,
    /// Commands handed to the hub.
    pub commands: Vec<SetpointCommand>,
}

pub struct ControlLoop<H, R> {
    hub: Arc<H>,
    overrides: OverrideService<R>,
    config: watch::Receiver<Arc<PlannerConfig>>,
    states: Arc<SystemStateStore>,
    debouncer: CommandDebouncer,
    period: Duration,
    last_external_temperature: Option<f64>,
}

impl<H, R> ControlLoop<H, R>
where
    H: HubClient + 'static,
    R: OverrideRepository,
{
    /// Create a loop ticking every second with a 10 second command debounce.
    pub fn new(
        hub: Arc<H>,
        overrides: OverrideService<R>,
        config: watch::Receiver<Arc<PlannerConfig>>,
        states: Arc<SystemStateStore>,
    ) -> Self {
        Self {
            hub,
            overrides,
            config,
            states,
            debouncer: CommandDebouncer::default(),
            period: Duration::from_secs(1),
            last_external_temperature: None,
        }
    }

    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, window: TimeDelta) -> Self {
        self.debouncer = CommandDebouncer::new(window);
        self
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period = ?self.period, "control loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.tick(now()).await;
        }

        tracing::info!("control loop stopped");
    }

    /// Run one evaluation of every configured system as of `now`.
    pub async fn tick(&mut self, now: Timestamp) -> TickReport {
        let config = Arc::clone(&self.config.borrow_and_update());
        let thermostats = config.thermostat_ids();
        self.states.retain(&thermostats);
        self.debouncer.retain(&thermostats);

        let mut report = TickReport::default();
        let tz = match config.time_zone() {
            Ok(tz) => tz,
            Err(err) => {
                tracing::error!(error = %err, "cannot evaluate schedules");
                report.skipped = config.thermostat_ids().into_iter().map(str::to_string).collect();
                return report;
            }
        };

        let overrides = match self.overrides.active_overrides(now).await {
            Ok(overrides) => overrides,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load overrides, ignoring them this tick");
                OverrideMap::new()
            }
        };
        let weather = self.weather(&config);

        for system in &config.systems {
            let id = &system.thermostat_entity_id;
            match self.process(system, &config, tz, &overrides, &weather, now).await {
                Ok(command) => {
                    report.processed.push(id.clone());
                    report.commands.extend(command);
                }
                Err(ZoneplanError::MissingState(err)) => {
                    tracing::warn!(thermostat = %id, error = %err, "skipping system");
                    report.skipped.push(id.clone());
                }
                Err(err) => {
                    tracing::error!(thermostat = %id, error = %err, "failed to process system");
                    report.skipped.push(id.clone());
                }
            }
        }
        report
    }

    async fn process(
        &mut self,
        system: &SystemConfig,
        config: &PlannerConfig,
        tz: Tz,
        overrides: &OverrideMap,
        weather: &WeatherData,
        now: Timestamp,
    ) -> Result<Option<SetpointCommand>, ZoneplanError> {
        let thermostat = self.fetch(&system.thermostat_entity_id)?;
        let sensors = system
            .temp_sensors
            .iter()
            .map(|id| self.fetch(id))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = planner::process_system(&SystemInputs {
            system,
            thermostat: &thermostat,
            sensors: &sensors,
            overrides,
            weather,
            tz,
            limits: &config.limits,
            tuning: &config.precondition,
            now,
        })?;

        for v in &outcome.violations {
            tracing::error!(
                thermostat = %system.thermostat_entity_id,
                sensor = %v.sensor,
                error = %v.violation,
                "cannot evaluate sensor rules, treating it as disconnected"
            );
        }
        self.apply_preconditions(outcome.preconditions).await;

        let status = &outcome.state.thermostat_status;
        let active = status.target_temp_type.is_active();
        let commanded = status.target_temp;
        self.states.update(&system.thermostat_entity_id, outcome.state);

        if !active || commanded.is_some_and(|c| (c.round() - outcome.new_target).abs() < f64::EPSILON) {
            return Ok(None);
        }
        if !self
            .debouncer
            .should_send(&system.thermostat_entity_id, outcome.new_target, now)
        {
            tracing::debug!(thermostat = %system.thermostat_entity_id, "setpoint command debounced");
            return Ok(None);
        }

        let command = SetpointCommand {
            entity_id: system.thermostat_entity_id.clone(),
            temperature: outcome.new_target,
        };
        self.send(command.clone());
        Ok(Some(command))
    }

    fn fetch(&self, entity_id: &str) -> Result<EntityState, MissingStateError> {
        self.hub
            .state(entity_id)
            .ok_or_else(|| MissingStateError::Entity {
                entity_id: entity_id.to_string(),
            })
    }

    fn weather(&mut self, config: &PlannerConfig) -> WeatherData {
        let external = self
            .hub
            .state(&config.external_sensor)
            .and_then(|s| s.state.trim().parse::<f64>().ok())
            .filter(|t| t.is_finite());
        if external != self.last_external_temperature {
            tracing::info!(temperature = ?external, "external temperature updated");
            self.last_external_temperature = external;
        }

        let condition = config
            .weather_entity
            .as_deref()
            .and_then(|id| self.hub.state(id))
            .map_or(WeatherCondition::Unknown, |s| WeatherCondition::from(s.state.as_str()));

        WeatherData::new(external.unwrap_or(DEFAULT_EXTERNAL_TEMPERATURE), condition)
    }

    /// Persist every precondition hold, concurrently, before the tick's
    /// state is published.
    async fn apply_preconditions(&self, requests: Vec<PreconditionRequest>) {
        let results = join_all(
            requests
                .into_iter()
                .map(|request| self.overrides.apply_precondition(request)),
        )
        .await;
        for result in results {
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to store precondition override");
            }
        }
    }

    /// Fire the command without waiting for the hub. A lost or failed call is
    /// retried naturally by a later tick.
    fn send(&self, command: SetpointCommand) {
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            let data = serde_json::json!({
                "entity_id": command.entity_id,
                "temperature": command.temperature,
            });
            match hub.call_service("climate", "set_temperature", data).await {
                Ok(_) => tracing::info!(
                    thermostat = %command.entity_id,
                    temperature = command.temperature,
                    "setpoint commanded"
                ),
                Err(err) => tracing::warn!(
                    thermostat = %command.entity_id,
                    temperature = command.temperature,
                    error = %err,
                    "failed to command setpoint"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use zoneplan_domain::entity::OperationMode;
    use zoneplan_domain::error::HubError;
    use zoneplan_domain::schedule::ScheduleRule;
    use zoneplan_domain::status::RuleType;

    use crate::override_store::InMemoryOverrideRepository;

    const THERMOSTAT: &str = "climate.hall";
    const SENSOR: &str = "sensor.hall";

    #[derive(Default)]
    struct FakeHub {
        states: Mutex<HashMap<String, EntityState>>,
        calls: Mutex<Vec<(String, String, Value)>>,
        fail: bool,
    }

    impl FakeHub {
        fn set(&self, entity: EntityState) {
            self.states.lock().unwrap().insert(entity.entity_id.clone(), entity);
        }

        fn remove(&self, entity_id: &str) {
            self.states.lock().unwrap().remove(entity_id);
        }

        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HubClient for FakeHub {
        fn state(&self, entity_id: &str) -> Option<EntityState> {
            self.states.lock().unwrap().get(entity_id).cloned()
        }

        fn call_service(
            &self,
            domain: &str,
            service: &str,
            data: Value,
        ) -> impl Future<Output = Result<Value, HubError>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push((domain.to_string(), service.to_string(), data));
            let fail = self.fail;
            async move {
                if fail {
                    Err(HubError::NotConnected)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    /// Friday 12:15 UTC.
    fn now() -> Timestamp {
        DateTime::parse_from_rfc3339("2022-07-08T12:15:16Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn thermostat(mode: &str, current: f64, setpoint: f64) -> EntityState {
        EntityState::new(THERMOSTAT, mode, now())
            .with_attribute("current_temperature", current)
            .with_attribute("temperature", setpoint)
            .with_attribute("hvac_action", "idle")
    }

    fn sensor(state: &str) -> EntityState {
        EntityState::new(SENSOR, state, now()).with_attribute("friendly_name", "Hall Temperature")
    }

    fn config(heating: Vec<ScheduleRule>, cooling: Vec<ScheduleRule>) -> PlannerConfig {
        let mut system = SystemConfig {
            thermostat_entity_id: THERMOSTAT.to_string(),
            thermostat_sensor: SENSOR.to_string(),
            temp_sensors: vec![SENSOR.to_string()],
            ..SystemConfig::default()
        };
        system.heating_schedule.insert(SENSOR.to_string(), heating);
        system.cooling_schedule.insert(SENSOR.to_string(), cooling);
        PlannerConfig {
            external_sensor: "sensor.outside".to_string(),
            systems: vec![system],
            ..PlannerConfig::default()
        }
    }

    fn every_day(temp: f64) -> Vec<ScheduleRule> {
        (0..7).map(|day| ScheduleRule::new(day, 0, temp, "All day")).collect()
    }

    struct Harness {
        hub: Arc<FakeHub>,
        repo: Arc<InMemoryOverrideRepository>,
        states: Arc<SystemStateStore>,
        config: watch::Sender<Arc<PlannerConfig>>,
        control: ControlLoop<FakeHub, Arc<InMemoryOverrideRepository>>,
    }

    impl Harness {
        fn new(hub: FakeHub, config: PlannerConfig) -> Self {
            let hub = Arc::new(hub);
            let repo = Arc::new(InMemoryOverrideRepository::new());
            let states = Arc::new(SystemStateStore::default());
            let (sender, receiver) = watch::channel(Arc::new(config));
            let control = ControlLoop::new(
                Arc::clone(&hub),
                OverrideService::new(Arc::clone(&repo)),
                receiver,
                Arc::clone(&states),
            );
            Self {
                hub,
                repo,
                states,
                config: sender,
                control,
            }
        }

        fn heating(setpoint: f64) -> Self {
            let hub = FakeHub::default();
            hub.set(thermostat("heat", 68.0, setpoint));
            hub.set(sensor("66"));
            Self::new(hub, config(every_day(70.0), every_day(76.0)))
        }

        async fn wait_for_calls(&self, count: usize) -> Vec<(String, String, Value)> {
            for _ in 0..100 {
                if self.hub.calls().len() >= count {
                    break;
                }
                tokio::task::yield_now().await;
            }
            self.hub.calls()
        }
    }

    // ── Commands ──

    #[tokio::test]
    async fn should_command_setpoint_when_device_is_behind() {
        let mut h = Harness::heating(68.0);

        let report = h.control.tick(now()).await;

        assert_eq!(report.processed, vec![THERMOSTAT]);
        assert_eq!(
            report.commands,
            vec![SetpointCommand {
                entity_id: THERMOSTAT.to_string(),
                temperature: 72.0,
            }]
        );
        let calls = h.wait_for_calls(1).await;
        assert_eq!(calls.len(), 1);
        let (domain, service, data) = &calls[0];
        assert_eq!(domain, "climate");
        assert_eq!(service, "set_temperature");
        assert_eq!(
            data,
            &serde_json::json!({"entity_id": THERMOSTAT, "temperature": 72.0})
        );
    }

    #[tokio::test]
    async fn should_not_command_when_setpoint_already_matches() {
        let mut h = Harness::heating(72.0);
        let report = h.control.tick(now()).await;
        assert_eq!(report.processed, vec![THERMOSTAT]);
        assert!(report.commands.is_empty());
    }

    #[tokio::test]
    async fn should_not_command_when_system_is_off() {
        let mut h = Harness::heating(68.0);
        h.hub.set(thermostat("off", 68.0, 68.0));

        let report = h.control.tick(now()).await;

        assert!(report.commands.is_empty());
        let state = h.states.get(THERMOSTAT).unwrap();
        assert_eq!(state.thermostat_status.target_temp_type, OperationMode::Off);
    }

    #[tokio::test]
    async fn should_debounce_identical_commands() {
        let mut h = Harness::heating(68.0);

        assert_eq!(h.control.tick(now()).await.commands.len(), 1);
        assert!(h.control.tick(now() + TimeDelta::seconds(1)).await.commands.is_empty());
        assert_eq!(
            h.control.tick(now() + TimeDelta::seconds(11)).await.commands.len(),
            1
        );
    }

    #[tokio::test]
    async fn should_keep_running_when_command_fails() {
        let hub = FakeHub {
            fail: true,
            ..FakeHub::default()
        };
        hub.set(thermostat("heat", 68.0, 68.0));
        hub.set(sensor("66"));
        let mut h = Harness::new(hub, config(every_day(70.0), every_day(76.0)));

        assert_eq!(h.control.tick(now()).await.commands.len(), 1);
        h.wait_for_calls(1).await;
        assert_eq!(h.control.tick(now() + TimeDelta::seconds(1)).await.processed.len(), 1);
    }

    // ── State ──

    #[tokio::test]
    async fn should_publish_system_state() {
        let mut h = Harness::heating(68.0);
        let mut sub = h.states.subscribe();

        h.control.tick(now()).await;

        let states = sub.recv().await.unwrap();
        let state = &states[THERMOSTAT];
        assert_eq!(state.thermostat_status.active_sensor.as_deref(), Some(SENSOR));
        assert_eq!(state.sensor_statuses.len(), 1);
        assert_eq!(state.sensor_statuses[0].label, "Hall");
    }

    #[tokio::test]
    async fn should_skip_system_with_missing_entity() {
        let mut h = Harness::heating(68.0);
        h.hub.remove(SENSOR);

        let report = h.control.tick(now()).await;

        assert!(report.processed.is_empty());
        assert_eq!(report.skipped, vec![THERMOSTAT]);
        assert!(h.states.get(THERMOSTAT).is_none());
    }

    #[tokio::test]
    async fn should_drop_state_of_removed_system() {
        let mut h = Harness::heating(68.0);
        h.control.tick(now()).await;
        assert!(h.states.get(THERMOSTAT).is_some());
        assert_eq!(h.control.debouncer.len(), 1);

        h.config.send_replace(Arc::new(PlannerConfig::default()));
        let report = h.control.tick(now()).await;

        assert!(report.processed.is_empty());
        assert!(h.states.snapshot().is_empty());
        assert!(h.control.debouncer.is_empty());
    }

    #[tokio::test]
    async fn should_process_system_when_one_sensor_rule_is_invalid() {
        let hub = FakeHub::default();
        hub.set(thermostat("heat", 68.0, 68.0));
        hub.set(sensor("66"));
        hub.set(EntityState::new("sensor.attic", "60", now()));
        let mut config = config(every_day(70.0), every_day(76.0));
        let system = &mut config.systems[0];
        system.temp_sensors.push("sensor.attic".to_string());
        system
            .heating_schedule
            .insert("sensor.attic".to_string(), vec![ScheduleRule::new(8, 0, 75.0, "Bad")]);
        let mut h = Harness::new(hub, config);

        let report = h.control.tick(now()).await;

        assert_eq!(report.processed, vec![THERMOSTAT]);
        assert_eq!(report.commands.len(), 1);
        let state = h.states.get(THERMOSTAT).unwrap();
        assert_eq!(state.thermostat_status.active_sensor.as_deref(), Some(SENSOR));
        assert_eq!(state.sensor_statuses[1].rule_type, RuleType::Disconnected);
    }

    // ── Preconditioning ──

    #[tokio::test]
    async fn should_store_precondition_override() {
        let hub = FakeHub::default();
        hub.set(thermostat("cool", 72.0, 72.0));
        hub.set(sensor("75"));
        hub.set(EntityState::new("sensor.outside", "80", now()));
        let cooling = vec![
            ScheduleRule::new(5, 0, 78.0, "Day"),
            ScheduleRule::new(5, 12 * 60 + 30, 70.0, "Evening"),
        ];
        let mut h = Harness::new(hub, config(every_day(68.0), cooling));

        h.control.tick(now()).await;

        let stored = h.repo.get_all().await.unwrap();
        let o = &stored[SENSOR];
        assert!(o.is_precondition());
        assert!((o.target_temp - 70.0).abs() < f64::EPSILON);
    }

    // ── Run ──

    #[tokio::test(start_paused = true)]
    async fn should_stop_on_shutdown() {
        let h = Harness::heating(72.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(h.control.with_period(Duration::from_millis(100)).run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(350)).await;
        shutdown_tx.send_replace(true);

        handle.await.unwrap();
    }
}
