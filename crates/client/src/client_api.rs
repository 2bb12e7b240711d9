//! Client API (`/api/client/...`): per-server control and the console.

use pt_domain::error::{Error, Result};
use pt_domain::models::{PowerSignal, Server, ServerStats, WebsocketCredentials};
use pt_websocket::{Connection, ReconnectPolicy};
use serde_json::json;

use crate::client::Client;
use crate::pagination::{ListOptions, Paginator};

/// Endpoints available to an account (`ptlc_`) key.
#[derive(Debug, Clone)]
pub struct ClientApi {
    client: Client,
}

fn require_id(server_id: &str) -> Result<()> {
    if server_id.trim().is_empty() {
        return Err(Error::InvalidArgument("server id cannot be empty".into()));
    }
    Ok(())
}

impl ClientApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Servers the key's account can access.
    pub async fn list_servers(
        &self,
        options: ListOptions,
    ) -> Result<(Vec<Server>, Paginator<Server, Client>)> {
        Paginator::start(self.client.clone(), "client", options).await
    }

    pub async fn get_server(&self, server_id: &str) -> Result<Server> {
        require_id(server_id)?;
        self.client
            .get_attributes(&format!("client/servers/{server_id}"))
            .await
    }

    /// Live power state and resource usage.
    pub async fn server_resources(&self, server_id: &str) -> Result<ServerStats> {
        require_id(server_id)?;
        self.client
            .get_attributes(&format!("client/servers/{server_id}/resources"))
            .await
    }

    pub async fn send_power_signal(&self, server_id: &str, signal: PowerSignal) -> Result<()> {
        require_id(server_id)?;
        tracing::info!(server_id, signal = %signal, "sending power signal");
        self.client
            .post_empty(
                &format!("client/servers/{server_id}/power"),
                &json!({ "signal": signal }),
            )
            .await
    }

    pub async fn send_command(&self, server_id: &str, command: &str) -> Result<()> {
        require_id(server_id)?;
        if command.is_empty() {
            return Err(Error::InvalidArgument("command cannot be empty".into()));
        }
        self.client
            .post_empty(
                &format!("client/servers/{server_id}/command"),
                &json!({ "command": command }),
            )
            .await
    }

    /// Signed token and socket URL for the server's console.
    pub async fn websocket_credentials(&self, server_id: &str) -> Result<WebsocketCredentials> {
        require_id(server_id)?;
        self.client
            .get_data(&format!("client/servers/{server_id}/websocket"))
            .await
    }

    /// Open the console without reconnection.
    pub async fn connect_websocket(&self, server_id: &str) -> Result<Connection> {
        self.open_console(server_id, None).await
    }

    /// Open the console with reconnection. `None` uses the client's
    /// configured policy.
    pub async fn connect_websocket_with_reconnect(
        &self,
        server_id: &str,
        policy: Option<ReconnectPolicy>,
    ) -> Result<Connection> {
        let policy = policy.unwrap_or_else(|| self.client.reconnect_policy().clone());
        self.open_console(server_id, Some(policy)).await
    }

    async fn open_console(
        &self,
        server_id: &str,
        policy: Option<ReconnectPolicy>,
    ) -> Result<Connection> {
        let creds = self.websocket_credentials(server_id).await?;
        let buffer = self.client.event_buffer();
        self.client
            .cancellable(Connection::connect_with_buffer(
                creds.socket_url,
                creds.token,
                policy,
                buffer,
            ))
            .await
    }
}
