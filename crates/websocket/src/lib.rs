//! `pt-websocket` — console event stream for a single game server.
//!
//! ```text
//!  Connection::connect(socket_url, token, policy)
//!        │
//!        ├─ dial + send {"event":"auth","args":[token]}
//!        │
//!        └─ read loop (spawned) ──► mpsc<Event> ──► next_event()
//!              │
//!              └─ stream fails ─► back off ─► redial + auth ─┐
//!                       ▲                                     │
//!                       └──────────── failed attempt ─────────┘
//! ```
//!
//! While reconnecting there is no live socket, so `send_command` and
//! `set_state` fail with `Error::ConnectionClosed`. Frames that are not
//! understood are dropped without reaching the channel.

pub mod connection;
pub mod reconnect;

pub use connection::{Connection, ConnectionHandle, DEFAULT_EVENT_BUFFER};
pub use reconnect::ReconnectPolicy;

// Re-export protocol types so callers never need to import pt-protocol directly.
pub use pt_protocol::{Event, Frame};
