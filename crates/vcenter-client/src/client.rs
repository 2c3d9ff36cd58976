//! vCenter API client
//!
//! Implements the host inventory query over the vSphere Web Services JSON
//! API (vSphere 8.0U1+): `/sdk/vim25/{release}/{ManagedObjectType}/{moid}/...`.
//! A session is opened lazily (or eagerly via [`VCenterClient::login`]) and
//! renewed once when vCenter answers `401`.

use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::*;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Header carrying the session token on every authenticated call
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Connection options for [`VCenterClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Accept self-signed or otherwise invalid TLS certificates
    pub insecure: bool,
    /// vim25 API release used in the URL path (e.g. "8.0.1.0")
    pub api_release: String,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
    /// Host summaries fetched concurrently during one enumeration
    pub max_concurrent_requests: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            insecure: false,
            api_release: "8.0.1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_concurrent_requests: 8,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    id: String,
    content: ServiceContent,
}

/// vCenter inventory client
pub struct VCenterClient {
    client: Client,
    base_url: String,
    api_release: String,
    username: String,
    password: String,
    max_concurrent_requests: usize,
    session: RwLock<Option<Session>>,
}

/// Destroys a container view if the enumeration owning it is dropped
/// before reaching its own `DestroyView` (timeout or cancellation).
struct ViewGuard {
    client: Client,
    url: String,
    session_id: String,
    view: String,
    armed: bool,
}

impl ViewGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Container view {} abandoned without a runtime to destroy it", self.view);
            return;
        };

        let request = self.client
            .post(&self.url)
            .header(SESSION_HEADER, &self.session_id)
            .header("Accept", "application/json");
        let view = std::mem::take(&mut self.view);
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Destroyed abandoned container view {}", view);
                }
                Ok(response) => {
                    warn!("Failed to destroy abandoned container view {}: {}", view, response.status());
                }
                Err(e) => {
                    warn!("Failed to destroy abandoned container view {}: {}", view, e);
                }
            }
        });
    }
}

/// Reduce a user supplied vCenter URL to `scheme://host[:port]`.
///
/// Accepts bare host names (`vcenter.lab`, https assumed) and govc style
/// URLs ending in `/sdk`. Credentials embedded in the URL are ignored.
pub fn normalize_endpoint(raw: &str) -> Result<String, InventoryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InventoryError::InvalidEndpoint("empty vCenter URL".to_string()));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = reqwest::Url::parse(&with_scheme)
        .map_err(|e| InventoryError::InvalidEndpoint(format!("{}: {}", raw, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(InventoryError::InvalidEndpoint(format!(
            "{}: unsupported scheme '{}'",
            raw,
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| InventoryError::InvalidEndpoint(format!("{}: missing host", raw)))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

impl VCenterClient {
    /// Create a new vCenter client
    ///
    /// # Arguments
    /// * `endpoint` - vCenter URL (e.g. "https://vcenter.lab/sdk")
    /// * `username` / `password` - credentials for `SessionManager.Login`
    /// * `options` - TLS, API release and timeout settings
    pub fn new(
        endpoint: &str,
        username: String,
        password: String,
        options: ClientOptions,
    ) -> Result<Self, InventoryError> {
        let base_url = normalize_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_release: options.api_release,
            username,
            password,
            max_concurrent_requests: options.max_concurrent_requests.max(1),
            session: RwLock::new(None),
        })
    }

    /// Get the normalized endpoint
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/sdk/vim25/{}/{}",
            self.base_url,
            self.api_release,
            path.trim_start_matches('/')
        )
    }

    /// Fetch `ServiceInstance.content` (no session required)
    pub async fn service_content(&self) -> Result<ServiceContent, InventoryError> {
        let url = self.api_url("ServiceInstance/ServiceInstance/content");
        debug!("Fetching service content from {}", self.base_url);

        let response = self.client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::read_json(response, "ServiceInstance content").await
    }

    /// Open a session now instead of on the first inventory call.
    ///
    /// Used at startup to fail fast on bad credentials or an unreachable
    /// endpoint.
    pub async fn login(&self) -> Result<(), InventoryError> {
        let session = self.open_session().await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn open_session(&self) -> Result<Session, InventoryError> {
        let content = self.service_content().await?;
        let session_manager = content.session_manager.as_ref().ok_or_else(|| {
            InventoryError::Api("service content has no session manager".to_string())
        })?;

        let url = self.api_url(&format!("SessionManager/{}/Login", session_manager.value));
        let body = serde_json::to_value(LoginRequest {
            user_name: &self.username,
            password: &self.password,
        })?;

        debug!("Logging in to vCenter {} as {}", self.base_url, self.username);
        let response = self.client
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::Authentication(format!(
                "login as {} rejected: {} - {}",
                self.username, status, body
            )));
        }

        let id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                InventoryError::Authentication("login response carried no session id".to_string())
            })?;

        info!("Logged in to vCenter {} as {}", self.base_url, self.username);
        Ok(Session { id, content })
    }

    async fn current_session(&self) -> Result<Session, InventoryError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.open_session().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Replace `stale_id` with a fresh session unless another caller already did.
    async fn renew_session(&self, stale_id: &str) -> Result<Session, InventoryError> {
        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            if session.id != stale_id {
                return Ok(session.clone());
            }
        }

        warn!("vCenter session for {} expired, logging in again", self.username);
        let session = self.open_session().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        session_id: &str,
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let builder = self.client
            .request(method, url)
            .header(SESSION_HEADER, session_id)
            .header("Accept", "application/json");
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }

    /// Send an authenticated request, re-logging in once on `401`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, InventoryError> {
        let url = self.api_url(path);
        debug!("{} {}", method, url);

        let session = self.current_session().await?;
        let response = self.request(method.clone(), &url, &session.id, body).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let session = self.renew_session(&session.id).await?;
        let response = self.request(method.clone(), &url, &session.id, body).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(InventoryError::Authentication(format!(
                "{} {} rejected after re-login",
                method, path
            )));
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, InventoryError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(InventoryError::Api(format!(
                "{} failed: {} - {}",
                what,
                status,
                text.chars().take(500).collect::<String>()
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            InventoryError::Api(format!(
                "error decoding {}: {} - Response (first 500 chars): {}",
                what,
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn create_host_view(&self, content: &ServiceContent) -> Result<ManagedObjectReference, InventoryError> {
        let view_manager = content.view_manager.as_ref().ok_or_else(|| {
            InventoryError::Api("service content has no view manager".to_string())
        })?;

        let body = serde_json::to_value(CreateContainerViewRequest {
            container: &content.root_folder,
            types: vec!["HostSystem"],
            recursive: true,
        })?;

        let response = self
            .send(
                Method::POST,
                &format!("ViewManager/{}/CreateContainerView", view_manager.value),
                Some(&body),
            )
            .await?;
        Self::read_json(response, "CreateContainerView").await
    }

    async fn host_summary(&self, host: &ManagedObjectReference) -> Result<HostListSummary, InventoryError> {
        let response = self
            .send(Method::GET, &format!("HostSystem/{}/summary", host.value), None)
            .await?;
        Self::read_json(response, &format!("summary of {}", host.value)).await
    }

    async fn collect_host_summaries(&self, view: &ManagedObjectReference) -> Result<Vec<HostSummary>, InventoryError> {
        let response = self
            .send(Method::GET, &format!("ContainerView/{}/view", view.value), None)
            .await?;
        let hosts: Vec<ManagedObjectReference> = Self::read_json(response, "ContainerView view").await?;
        debug!("Container view {} holds {} hosts", view.value, hosts.len());

        // buffered keeps the view order, which is the enumeration order
        let requests: Vec<_> = hosts.iter().map(|host| self.host_summary(host)).collect();
        let summaries: Vec<HostListSummary> = stream::iter(requests)
            .buffered(self.max_concurrent_requests)
            .try_collect()
            .await?;

        Ok(hosts
            .iter()
            .zip(summaries)
            .filter_map(|(host, summary)| {
                let flattened = summary.into_host_summary();
                if flattened.is_none() {
                    warn!("Skipping host {} without config or hardware summary (disconnected?)", host.value);
                }
                flattened
            })
            .collect())
    }

    async fn destroy_view(&self, view: &ManagedObjectReference) {
        let path = format!("ContainerView/{}/DestroyView", view.value);
        match self.send(Method::POST, &path, None).await {
            Ok(response) if response.status().is_success() => {
                debug!("Destroyed container view {}", view.value);
            }
            Ok(response) => {
                warn!("Failed to destroy container view {}: {}", view.value, response.status());
            }
            Err(e) => {
                warn!("Failed to destroy container view {}: {}", view.value, e);
            }
        }
    }

    /// List every host with its hardware and quick stats summary.
    ///
    /// Hosts are returned in the order vCenter lists them in the container
    /// view, with at most `max_concurrent_requests` summaries in flight. The
    /// view is destroyed afterwards whether the listing succeeded, failed or
    /// was dropped mid-way.
    pub async fn enumerate_hosts(&self) -> Result<Vec<HostSummary>, InventoryError> {
        let session = self.current_session().await?;
        let view = self.create_host_view(&session.content).await?;

        // A 401 during view creation may have replaced the session
        let session_id = match self.session.try_read() {
            Ok(current) => current.as_ref().map_or(session.id.clone(), |s| s.id.clone()),
            Err(_) => session.id.clone(),
        };
        let mut guard = ViewGuard {
            client: self.client.clone(),
            url: self.api_url(&format!("ContainerView/{}/DestroyView", view.value)),
            session_id,
            view: view.value.clone(),
            armed: true,
        };

        let result = self.collect_host_summaries(&view).await;
        self.destroy_view(&view).await;
        guard.disarm();
        result
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for VCenterClient {
    fn endpoint(&self) -> &str {
        self.endpoint()
    }

    async fn enumerate_hosts(&self) -> Result<Vec<HostSummary>, InventoryError> {
        self.enumerate_hosts().await
    }
}
