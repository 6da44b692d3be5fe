//! # zoneplan-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `HubClient`: cached entity states and service calls on the hub
//!   - `OverrideRepository`: persistence for overrides
//!   - `ConfigRepository`: persistence for the planner configuration
//! - Hold the shared runtime state behind explicit objects:
//!   - `ConfigStore`: current configuration, change notification
//!   - `SystemStateStore`: last computed state per thermostat, publish/subscribe
//! - Provide the **use-cases**:
//!   - `OverrideService`: list, add, delete and precondition overrides
//!   - `ControlLoop`: the fixed-cadence driver that resolves every system and
//!     commands setpoints
//!
//! ## Dependency rule
//! Depends on `zoneplan-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config_store;
pub mod control_loop;
pub mod debounce;
pub mod override_store;
pub mod ports;
pub mod services;
pub mod system_state;
