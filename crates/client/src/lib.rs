//! `pt-client` — typed client for a game-server panel's REST API.
//!
//! ```text
//!  Client ──► Transport (auth headers, retry, 429 waits) ──► check_response
//!    │                                                         │
//!    ├─ application() ─► ApplicationApi ─┐                      ▼
//!    ├─ client_api()  ─► ClientApi ──────┼──► Paginator ◄── ListEnvelope<T>
//!    │                        │          │
//!    │                        └─► websocket_credentials ─► pt_websocket::Connection
//!    └─ helpers::wait_for_state
//! ```
//!
//! Every call honours the client's shutdown token and, for clones made with
//! [`Client::with_cancellation`], the caller's token too.

pub mod application;
pub mod client;
pub mod client_api;
pub mod helpers;
pub mod pagination;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use application::ApplicationApi;
pub use client::{Client, ClientBuilder};
pub use client_api::ClientApi;
pub use helpers::wait_for_state;
pub use pagination::{ListEnvelope, ListOptions, PageSource, Paginator};

pub use pt_domain::error::{Error, Result};
pub use pt_domain::models;
pub use pt_transport::RetryPolicy;
pub use pt_websocket::{Connection, ConnectionHandle, Event, ReconnectPolicy};
