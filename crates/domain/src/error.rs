//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`ZoneplanError`] via `#[from]`. Variants carry typed sources rather than
//! free-form strings wherever the cause is known.

use std::time::Duration;

/// Top-level error for the zoneplan workspace.
#[derive(Debug, thiserror::Error)]
pub enum ZoneplanError {
    /// Talking to the home-automation hub failed.
    #[error("hub error")]
    Hub(#[from] HubError),

    /// An entity or attribute needed for a system was not available.
    #[error("missing state")]
    MissingState(#[from] MissingStateError),

    /// A computation produced a value that should be impossible.
    #[error("invariant violation")]
    Invariant(#[from] InvariantViolation),

    /// User-supplied data failed a sanity check.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A persistence backend failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures of the hub connection or of an individual remote call.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Transient transport failure; the client reconnects on its own.
    #[error("hub connection failed")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The hub rejected the access token. Never retried.
    #[error("hub rejected the access token")]
    Authentication,

    /// No response with a matching id arrived in time.
    #[error("no response to request {id} within {timeout:?}")]
    RpcTimeout { id: u64, timeout: Duration },

    /// The hub answered the request with `success: false`.
    #[error("request {id} failed: {message}")]
    CallFailed { id: u64, message: String },

    /// There is no open session to send the request over.
    #[error("hub not connected")]
    NotConnected,

    /// The reconnection budget ran out.
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The client was torn down.
    #[error("hub client destroyed")]
    Destroyed,
}

/// An entity (or one of its attributes) needed for evaluation is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MissingStateError {
    #[error("no state for entity {entity_id}")]
    Entity { entity_id: String },

    #[error("entity {entity_id} has no usable `{attribute}` attribute")]
    Attribute {
        entity_id: String,
        attribute: &'static str,
    },
}

/// A logic defect detected while resolving rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// The next occurrence of a weekly rule landed before the reference instant.
    #[error("next occurrence of day {day} minute {minute} is {delta_ms}ms in the past")]
    NegativeDelta { day: u8, minute: u16, delta_ms: i64 },

    /// A rule outside the weekly cycle reached the resolver.
    #[error("rule day {day} minute {minute} is outside the weekly cycle")]
    RuleOutOfRange { day: u8, minute: u16 },

    /// The local wall-clock time does not exist in the configured zone.
    #[error("local time {local} does not exist in the configured time zone")]
    NonexistentLocalTime { local: String },
}

/// Sanity checks on configuration and user input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),

    #[error("thermostat entity id must not be empty")]
    EmptyThermostatId,

    #[error("thermostat {0} is configured more than once")]
    DuplicateThermostat(String),

    #[error("rule day {day} minute {minute} is outside the weekly cycle")]
    RuleOutOfRange { day: u8, minute: u16 },

    #[error("temperature {value} is outside {min}..={max}")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
}

impl ZoneplanError {
    /// Wrap any backend error as [`ZoneplanError::Storage`].
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}
