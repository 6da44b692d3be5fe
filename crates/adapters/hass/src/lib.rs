//! # zoneplan-adapter-hass
//!
//! Home Assistant adapter: keeps a websocket session with the hub and
//! exposes it through the [`HubClient`](zoneplan_app::ports::HubClient) port.
//!
//! ## How it works
//!
//! 1. Open `{protocol}://{host}:{port}/api/websocket`
//! 2. Answer `auth_required` with the access token
//! 3. On `auth_ok`, seed the entity cache with `get_states` and subscribe to
//!    `state_changed`
//! 4. Route every later frame: events update the cache, results resolve the
//!    pending request with the same `id`
//!
//! Lost connections are retried every `retry_timeout_ms`, up to
//! `retry_count` times. A rejected token is final.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `zoneplan-app` and `zoneplan-domain`.

mod cache;
mod client;
mod config;
mod error;
mod message;

pub use client::{ConnectionStatus, FatalReason, HassClient};
pub use config::HassConfig;
pub use error::HassError;
