//! Websocket wire format.
//!
//! Every frame is a JSON object with a `type`. Requests carry a client-chosen
//! `id` that the hub echoes in its answer; the initial `auth` message carries
//! none. Push events arrive as `type: "event"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zoneplan_domain::entity::EntityState;

/// Messages sent to the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Auth {
        access_token: String,
    },
    GetStates {
        id: u64,
    },
    SubscribeEvents {
        id: u64,
        event_type: String,
    },
    CallService {
        id: u64,
        domain: String,
        service: String,
        service_data: Value,
    },
}

impl Outbound {
    /// Encode as a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if `service_data` cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Any message received from the hub.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub event: Option<Event>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl Inbound {
    pub const AUTH_REQUIRED: &'static str = "auth_required";
    pub const AUTH_OK: &'static str = "auth_ok";
    pub const AUTH_INVALID: &'static str = "auth_invalid";
    pub const EVENT: &'static str = "event";

    /// Explanation of a failed request, falling back to the error code.
    #[must_use]
    pub fn failure_message(&self) -> String {
        match &self.error {
            Some(err) if !err.message.is_empty() => err.message.clone(),
            Some(err) if !err.code.is_empty() => err.code.clone(),
            _ => "request failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of a `state_changed` event. A `None` new state means the entity
/// was removed.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChanged {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

pub const STATE_CHANGED: &str = "state_changed";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
