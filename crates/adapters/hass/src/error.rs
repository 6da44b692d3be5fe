//! Home Assistant adapter error types.

use tokio_tungstenite::tungstenite;
use zoneplan_domain::error::{HubError, ZoneplanError};

/// Errors specific to the Home Assistant adapter.
#[derive(Debug, thiserror::Error)]
pub enum HassError {
    /// The websocket transport failed.
    #[error("websocket error")]
    WebSocket(#[source] Box<tungstenite::Error>),

    /// A frame could not be encoded or decoded as JSON.
    #[error("failed to process hub message")]
    Json(#[source] serde_json::Error),

    /// The hub closed the session.
    #[error("hub closed the connection")]
    Closed,
}

impl From<tungstenite::Error> for HassError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<serde_json::Error> for HassError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl HassError {
    /// Convert into a transient [`HubError::Connection`] for propagation
    /// across the hub port.
    pub fn into_domain(self) -> HubError {
        HubError::Connection(Box::new(self))
    }
}

impl From<HassError> for ZoneplanError {
    fn from(err: HassError) -> Self {
        Self::Hub(err.into_domain())
    }
}
