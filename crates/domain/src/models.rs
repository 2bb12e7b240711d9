//! Resource DTOs surfaced by the client crate.
//!
//! Only the shapes the client actually returns live here; fields the panel
//! may omit carry `#[serde(default)]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live resource usage, as reported by `/resources` and the `stats` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub memory_bytes: i64,
    #[serde(default)]
    pub memory_limit_bytes: i64,
    #[serde(default)]
    pub cpu_absolute: f64,
    #[serde(default)]
    pub disk_bytes: i64,
    #[serde(default)]
    pub network_rx_bytes: i64,
    #[serde(default)]
    pub network_tx_bytes: i64,
    #[serde(default)]
    pub uptime: i64,
}

/// `GET client/servers/{id}/resources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub resources: Resources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub swap: i64,
    #[serde(default)]
    pub disk: i64,
    #[serde(default)]
    pub io: i64,
    #[serde(default)]
    pub cpu: i64,
}

/// A server as returned by either API surface. The application API fills
/// `id`/`user`/`node`; the client API fills `identifier`/`node_name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub user: u64,
    #[serde(default)]
    pub node: serde_json::Value,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub uuid: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub root_admin: bool,
    #[serde(default, rename = "2fa")]
    pub two_factor: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub disk: i64,
    #[serde(default)]
    pub location_id: u64,
}

/// Signed credentials for a server's console websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsocketCredentials {
    pub token: String,
    #[serde(rename = "socket")]
    pub socket_url: String,
}

/// Power signals accepted by `client/servers/{id}/power` and the console
/// `set state` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSignal::Start => "start",
            PowerSignal::Stop => "stop",
            PowerSignal::Restart => "restart",
            PowerSignal::Kill => "kill",
        }
    }
}

impl std::fmt::Display for PowerSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
