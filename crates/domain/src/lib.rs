//! # zoneplan-domain
//!
//! Pure domain model for the zoneplan thermostat planner.
//!
//! ## Responsibilities
//! - Foundational types: error conventions, timestamps, weekly-cycle arithmetic
//! - Define **Entity states** (the hub's view of sensors and thermostats)
//! - Define **Schedules** (weekly rules per sensor and operating mode)
//! - Define **Overrides** (temporary holds that supersede the schedule)
//! - Define **Weather** (outdoor temperature and condition)
//! - Define **Statuses** (per-sensor and per-thermostat snapshots)
//! - Define the **Planner configuration**
//! - Contain the **rule resolver** ([`planner`]), a pure function of its inputs
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod config;
pub mod entity;
pub mod overrides;
pub mod planner;
pub mod schedule;
pub mod status;
pub mod weather;
