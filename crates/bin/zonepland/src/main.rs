//! # zonepland: zoneplan daemon
//!
//! Composition root that wires the hub adapter, the stores and the control
//! loop together.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file) and initialise logging
//! - Load the planner configuration from its TOML file
//! - Keep a Home Assistant session matching the configured host and token
//! - Run the control loop and log every system state change
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod hub;
mod repository;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use zoneplan_app::config_store::ConfigStore;
use zoneplan_app::control_loop::ControlLoop;
use zoneplan_app::override_store::InMemoryOverrideRepository;
use zoneplan_app::services::override_service::OverrideService;
use zoneplan_app::system_state::{StateSubscription, SystemStateStore};

use crate::config::Config;
use crate::hub::SharedHub;
use crate::repository::TomlConfigRepository;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    let planner = ConfigStore::load(TomlConfigRepository::new(
        config.storage.planner_config_path.clone(),
    ))
    .await?;
    tracing::info!(
        path = %config.storage.planner_config_path.display(),
        systems = planner.snapshot().systems.len(),
        "planner configuration loaded"
    );

    let states = Arc::new(SystemStateStore::default());
    let hub = Arc::new(SharedHub::default());
    let overrides = OverrideService::new(InMemoryOverrideRepository::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = tokio::spawn(hub::supervise(
        Arc::clone(&hub),
        config.hub.clone(),
        planner.subscribe(),
        shutdown_rx.clone(),
    ));
    let control = ControlLoop::new(hub, overrides, planner.subscribe(), Arc::clone(&states))
        .with_period(config.control.tick())
        .with_debounce(config.control.debounce());
    let control = tokio::spawn(control.run(shutdown_rx.clone()));
    let reporter = tokio::spawn(report_states(states.subscribe(), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown_tx.send_replace(true);

    let (control, supervisor, reporter) = tokio::join!(control, supervisor, reporter);
    for result in [control, supervisor, reporter] {
        if let Err(err) = result {
            tracing::error!(%err, "task ended abnormally");
        }
    }
    Ok(())
}

/// Log every system whose state changed.
async fn report_states(mut subscription: StateSubscription, mut shutdown: watch::Receiver<bool>) {
    let mut last = zoneplan_domain::status::SystemStates::new();
    loop {
        tokio::select! {
            states = subscription.recv() => {
                let Some(states) = states else {
                    break;
                };
                for (thermostat, state) in states.iter() {
                    if last.get(thermostat).is_some_and(|previous| previous.same_as(state)) {
                        continue;
                    }
                    let status = &state.thermostat_status;
                    tracing::info!(
                        %thermostat,
                        mode = %status.target_temp_type,
                        setpoint = ?status.target_temp,
                        current = status.functional_current_temp,
                        active_sensor = ?status.active_sensor,
                        "system state changed"
                    );
                }
                last = (*states).clone();
            }
            _ = shutdown.changed() => break,
        }
    }
    subscription.unsubscribe();
}
