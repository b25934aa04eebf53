//! Connection State Machine
//!
//! Lifecycle of the link to one belt. Transitions consume the current state
//! and yield the next one together with the effects the owner must carry out
//! and an audit entry for logging.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link to a belt
    #[default]
    Disconnected,
    /// Link opening or handshake in progress
    Connecting,
    /// Handshake completed, operating mode known
    Connected,
    /// Close requested, waiting for the link to report closure
    Disconnecting,
}

impl ConnectionState {
    /// Get current state name for logging/audit
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        }
    }

    /// True while a link is open or opening
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Caller asked to connect
    ConnectRequested,
    /// Transport opened and handshake completed
    HandshakeCompleted,
    /// Transport open or handshake failed
    ConnectFailed { reason: String },
    /// Caller asked to disconnect
    DisconnectRequested,
    /// Transport reported the end of the link
    LinkClosed { reason: Option<String> },
}

/// Work the state owner must carry out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEffect {
    /// Clear mode, channels and cached parameters for a fresh session
    ResetSession,
    /// Resolve every pending command as disconnected
    FailPending,
    /// Close the transport
    CloseLink,
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: ConnectionState,
    pub effects: Vec<ConnectionEffect>,
    /// True when the link ended without a local request
    pub unsolicited: bool,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Milliseconds since UNIX epoch
    pub timestamp: u64,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
}

impl ConnectionState {
    /// Process an event and transition to the next state (consumes self)
    pub fn transition(self, event: ConnectionEvent) -> Result<StateTransition, StateTransitionError> {
        use ConnectionEffect::*;

        let from_state = self.state_name().to_string();
        let event_name = format!("{:?}", event);

        let (new_state, effects, unsolicited) = match (self, event) {
            (ConnectionState::Disconnected, ConnectionEvent::ConnectRequested) => {
                (ConnectionState::Connecting, vec![ResetSession], false)
            }

            (ConnectionState::Connecting, ConnectionEvent::HandshakeCompleted) => {
                (ConnectionState::Connected, Vec::new(), false)
            }

            (ConnectionState::Connecting, ConnectionEvent::ConnectFailed { .. }) => {
                (ConnectionState::Disconnected, vec![FailPending, CloseLink, ResetSession], false)
            }

            (
                ConnectionState::Connecting | ConnectionState::Connected,
                ConnectionEvent::DisconnectRequested,
            ) => (ConnectionState::Disconnecting, vec![FailPending, CloseLink], false),

            (ConnectionState::Disconnecting, ConnectionEvent::LinkClosed { .. }) => {
                (ConnectionState::Disconnected, vec![FailPending, ResetSession], false)
            }

            (
                ConnectionState::Connecting | ConnectionState::Connected,
                ConnectionEvent::LinkClosed { .. },
            ) => (
                ConnectionState::Disconnected,
                vec![FailPending, CloseLink, ResetSession],
                true,
            ),

            (state, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: from_state.clone(),
                    event: event_name,
                    reason: format!("Event {:?} not valid for state {}", event, state),
                });
            }
        };

        let audit_entry = AuditEntry {
            timestamp: current_timestamp(),
            from_state,
            to_state: new_state.state_name().to_string(),
            event: event_name,
        };

        Ok(StateTransition {
            new_state,
            effects,
            unsolicited,
            audit_entry,
        })
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    /// Invalid state transition attempted
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTransitionError::InvalidTransition {
                from_state,
                event,
                reason,
            } => write!(
                f,
                "Invalid transition from {} on event {}: {}",
                from_state, event, reason
            ),
        }
    }
}

impl std::error::Error for StateTransitionError {}

/// Get current timestamp in milliseconds since UNIX epoch
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
