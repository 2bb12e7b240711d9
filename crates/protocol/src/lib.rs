//! Console websocket protocol: wire frames and decoded events.
//!
//! Every frame in either direction is `{"event": <tag>, "args": [<string>…]}`.
//! The client opens with an `auth` frame carrying the signed token; the
//! server then streams console lines, stats snapshots and power-state
//! changes.

use pt_domain::models::{PowerSignal, Resources};
use serde::{Deserialize, Serialize};

// ── Outbound tags ───────────────────────────────────────────────────

pub const EVENT_AUTH: &str = "auth";
pub const EVENT_SEND_COMMAND: &str = "send command";
pub const EVENT_SET_STATE: &str = "set state";

// ── Inbound tags ────────────────────────────────────────────────────

pub const EVENT_CONSOLE_OUTPUT: &str = "console output";
pub const EVENT_STATS: &str = "stats";
pub const EVENT_STATUS: &str = "status";
pub const EVENT_JWT_ERROR: &str = "jwt error";
pub const EVENT_TOKEN_EXPIRING: &str = "token expiring";
pub const EVENT_TOKEN_EXPIRED: &str = "token expired";

/// Raw wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Frame {
    pub fn new(event: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            args: vec![arg.into()],
        }
    }

    /// Handshake frame sent right after every dial.
    pub fn auth(token: &str) -> Self {
        Self::new(EVENT_AUTH, token)
    }

    pub fn send_command(command: &str) -> Self {
        Self::new(EVENT_SEND_COMMAND, command)
    }

    pub fn set_state(signal: PowerSignal) -> Self {
        Self::new(EVENT_SET_STATE, signal.as_str())
    }

    pub fn to_json(&self) -> String {
        // A struct of strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a text frame. Malformed JSON yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed frame");
                None
            }
        }
    }

    /// Map the frame onto an [`Event`].
    ///
    /// Unknown tags, and known tags missing their argument or carrying an
    /// undecodable stats payload, yield `None`.
    pub fn into_event(self) -> Option<Event> {
        let first = self.args.into_iter().next();
        match self.event.as_str() {
            EVENT_CONSOLE_OUTPUT => first.map(|line| Event::ConsoleOutput { line }),
            EVENT_STATS => first
                .and_then(|raw| serde_json::from_str::<Resources>(&raw).ok())
                .map(|resources| Event::Stats { resources }),
            EVENT_STATUS => first.map(|state| Event::StatusChange { state }),
            EVENT_JWT_ERROR | EVENT_TOKEN_EXPIRING | EVENT_TOKEN_EXPIRED => {
                Some(Event::AuthExpired)
            }
            other => {
                tracing::trace!(event = %other, "ignoring unrecognized event");
                None
            }
        }
    }
}

/// A decoded server → client event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// One line of console output.
    ConsoleOutput { line: String },
    /// Resource usage snapshot.
    Stats { resources: Resources },
    /// Power state changed (`running`, `offline`, `starting`, `stopping`).
    StatusChange { state: String },
    /// The socket token is expiring, expired, or was rejected. Fetch fresh
    /// credentials and reconnect.
    AuthExpired,
}

/// Parse and map a text frame in one step.
pub fn decode_event(text: &str) -> Option<Event> {
    Frame::parse(text).and_then(Frame::into_event)
}
