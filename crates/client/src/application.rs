//! Application API (`/api/application/...`).

use pt_domain::error::{Error, Result};
use pt_domain::models::{Node, Server, User};

use crate::client::Client;
use crate::pagination::{ListOptions, Paginator};

/// Administrative endpoints. Requires an application (`ptla_`) key.
#[derive(Debug, Clone)]
pub struct ApplicationApi {
    client: Client,
}

impl ApplicationApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn list_servers(
        &self,
        options: ListOptions,
    ) -> Result<(Vec<Server>, Paginator<Server, Client>)> {
        Paginator::start(self.client.clone(), "application/servers", options).await
    }

    pub async fn get_server(&self, id: u64) -> Result<Server> {
        self.client
            .get_attributes(&format!("application/servers/{id}"))
            .await
    }

    pub async fn list_users(
        &self,
        options: ListOptions,
    ) -> Result<(Vec<User>, Paginator<User, Client>)> {
        Paginator::start(self.client.clone(), "application/users", options).await
    }

    pub async fn get_user(&self, id: u64) -> Result<User> {
        self.client
            .get_attributes(&format!("application/users/{id}"))
            .await
    }

    /// Look a user up by the external ID set at creation time.
    pub async fn get_user_by_external_id(&self, external_id: &str) -> Result<User> {
        if external_id.is_empty() {
            return Err(Error::InvalidArgument("external id cannot be empty".into()));
        }
        self.client
            .get_attributes(&format!("application/users/external/{external_id}"))
            .await
    }

    pub async fn list_nodes(
        &self,
        options: ListOptions,
    ) -> Result<(Vec<Node>, Paginator<Node, Client>)> {
        Paginator::start(self.client.clone(), "application/nodes", options).await
    }

    pub async fn get_node(&self, id: u64) -> Result<Node> {
        self.client
            .get_attributes(&format!("application/nodes/{id}"))
            .await
    }
}
