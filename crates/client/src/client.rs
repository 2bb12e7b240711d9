//! Root panel client: URL resolution, request execution, response checks.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pt_domain::config::ClientConfig;
use pt_domain::error::{Error, Result};
use pt_transport::{check_response, from_reqwest, RetryPolicy, Transport};
use pt_websocket::{ReconnectPolicy, DEFAULT_EVENT_BUFFER};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Request, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::application::ApplicationApi;
use crate::client_api::ClientApi;
use crate::pagination::{Item, PageSource};

const DEFAULT_USER_AGENT: &str = concat!("pterodactyl-rs/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Panel API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the root
/// shutdown token.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    base_url: Url,
    reconnect: ReconnectPolicy,
    event_buffer: usize,
    shutdown: CancellationToken,
    /// Extra caller-supplied token, see [`with_cancellation`](Self::with_cancellation).
    scope: Option<CancellationToken>,
}

impl Client {
    pub fn builder(panel_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(panel_url)
    }

    /// Build a client from a validated [`ClientConfig`].
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.ensure_valid()?;
        let api_key = config.resolve_api_key()?;

        Self::builder(config.panel_url.clone())
            .api_key(api_key)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .retry_policy(RetryPolicy::try_from(&config.retry)?)
            .reconnect_policy(ReconnectPolicy::from(&config.websocket))
            .event_buffer(config.websocket.event_buffer)
            .build()
    }

    /// Application API (`/api/application/...`), for admin keys.
    pub fn application(&self) -> ApplicationApi {
        ApplicationApi::new(self.clone())
    }

    /// Client API (`/api/client/...`), for account keys.
    pub fn client_api(&self) -> ClientApi {
        ClientApi::new(self.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.policy()
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    /// A clone whose calls also stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            scope: Some(token),
            ..self.clone()
        }
    }

    /// Cancel every in-flight and future call on this client and its clones.
    pub fn shutdown(&self) {
        tracing::info!(base_url = %self.base_url, "panel client shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ── request helpers ──────────────────────────────────────────────

    /// Resolve a path like `client/servers/abc` against the `/api/` base.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Url(format!("{path}: {e}")))
    }

    /// Send one request through the retrying transport and check the
    /// response status. Non-2xx statuses become [`Error::Api`].
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let url = self.url(path)?;
        let mut request = Request::new(method, url);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)?;
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *request.body_mut() = Some(bytes.into());
        }
        self.execute(request).await
    }

    /// Execute a prepared request. Standard headers are added by the
    /// transport.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let resp = match &self.scope {
            Some(scope) => tokio::select! {
                biased;
                _ = scope.cancelled() => Err(Error::Cancelled),
                r = self.transport.execute(request, &self.shutdown) => r,
            },
            None => self.transport.execute(request, &self.shutdown).await,
        }?;
        check_response(&method, resp).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.request::<()>(Method::GET, path, None).await?;
        decode(resp).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.request(Method::POST, path, Some(body)).await?;
        decode(resp).await
    }

    /// POST and ignore the response body (the panel answers 204).
    pub async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let resp = self.request(Method::POST, path, Some(body)).await?;
        resp.bytes().await.map_err(from_reqwest)?;
        Ok(())
    }

    /// GET a single resource and unwrap its `{object, attributes}` wrapper.
    pub async fn get_attributes<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let item: Item<T> = self.get_json(path).await?;
        Ok(item.attributes)
    }

    /// GET a `{"data": ...}` response and unwrap it.
    pub(crate) async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        #[derive(Deserialize)]
        struct Data<T> {
            data: T,
        }
        let wrapped: Data<T> = self.get_json(path).await?;
        Ok(wrapped.data)
    }

    /// Race `fut` against both cancellation tokens.
    pub(crate) async fn cancellable<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let scope = self.scope.clone().unwrap_or_default();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            _ = scope.cancelled() => Err(Error::Cancelled),
            r = fut => r,
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let body = resp.bytes().await.map_err(from_reqwest)?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl PageSource for Client {
    async fn get_page(&self, path: &str, query: &[(String, String)]) -> Result<Bytes> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let resp = self.execute(Request::new(Method::GET, url)).await?;
        resp.bytes().await.map_err(from_reqwest)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fluent builder for [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> pt_domain::Result<()> {
/// let client = pt_client::Client::builder("https://panel.example.com")
///     .api_key("ptlc_xxxxxxxx")
///     .build()?;
/// let (servers, _pager) = client.client_api().list_servers(Default::default()).await?;
/// # let _ = servers;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    panel_url: String,
    api_key: Option<String>,
    user_agent: String,
    timeout: Duration,
    retry: RetryPolicy,
    reconnect: ReconnectPolicy,
    event_buffer: usize,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn new(panel_url: impl Into<String>) -> Self {
        Self {
            panel_url: panel_url.into(),
            api_key: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            http: None,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Per-attempt HTTP timeout. Ignored when an HTTP client is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Policy used by `connect_websocket_with_reconnect` when no explicit
    /// policy is passed.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Use a preconfigured `reqwest::Client` (proxies, custom TLS roots).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<Client> {
        let trimmed = self.panel_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("panel_url cannot be empty".into()));
        }
        let base_url = Url::parse(&format!("{trimmed}/api/"))
            .map_err(|e| Error::Url(format!("invalid panel_url '{}': {e}", self.panel_url)))?;

        let api_key = self.api_key.unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(base_url = %base_url, "panel client built without an api key");
        }

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Http(e.to_string()))?,
        };
        let transport = Transport::new(http, &api_key, &self.user_agent, self.retry)?;

        Ok(Client {
            transport,
            base_url,
            reconnect: self.reconnect,
            event_buffer: self.event_buffer.max(1),
            shutdown: CancellationToken::new(),
            scope: None,
        })
    }
}
