/// Proxy probe and admin transports
use crate::core::Proxy;
use crate::error::{MonitorResult, RemoteError};
use crate::utils::xauth;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lightweight stats reported by a proxy.
///
/// Only the admission flags are interpreted; every other field is kept
/// verbatim for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyStatsPayload {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProxyStatsPayload {
    pub fn new(online: bool, closed: bool) -> Self {
        Self {
            online,
            closed,
            extra: serde_json::Map::new(),
        }
    }

    /// A proxy that is neither serving nor deliberately closed is stuck in
    /// a transitional state and may be brought online.
    pub fn needs_online(&self) -> bool {
        !self.closed && !self.online
    }
}

/// Fetches the lightweight stats of a proxy
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn stats_simple(&self, proxy: &Proxy) -> Result<ProxyStatsPayload, RemoteError>;
}

/// Issues administrative commands to a proxy
#[async_trait]
pub trait ProxyAdmin: Send + Sync {
    /// Ask the proxy at `admin_addr` to start serving
    async fn online(&self, admin_addr: &str) -> Result<(), RemoteError>;
}

/// Client for the proxy's HTTP admin API
#[derive(Debug, Clone)]
pub struct HttpProxyClient {
    client: reqwest::Client,
    product_name: String,
    product_auth: String,
}

impl HttpProxyClient {
    pub fn new(product_name: &str, product_auth: &str) -> MonitorResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .build()?;
        Ok(Self {
            client,
            product_name: product_name.to_string(),
            product_auth: product_auth.to_string(),
        })
    }

    fn xauth(&self, token: &str) -> String {
        xauth(&[self.product_name.as_str(), self.product_auth.as_str(), token])
    }

    async fn checked(
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = response?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(format!("[{}] {}", status, body.trim())))
    }
}

#[async_trait]
impl ProxyTransport for HttpProxyClient {
    async fn stats_simple(&self, proxy: &Proxy) -> Result<ProxyStatsPayload, RemoteError> {
        let url = format!(
            "http://{}/api/proxy/stats/{}?flags=0",
            proxy.admin_addr,
            self.xauth(&proxy.token)
        );
        let response = Self::checked(self.client.get(&url).send().await).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProxyAdmin for HttpProxyClient {
    async fn online(&self, admin_addr: &str) -> Result<(), RemoteError> {
        let url = format!("http://{}/api/proxy/model", admin_addr);
        let model: Proxy = Self::checked(self.client.get(&url).send().await)
            .await?
            .json()
            .await?;

        let url = format!(
            "http://{}/api/proxy/start/{}",
            admin_addr,
            self.xauth(&model.token)
        );
        Self::checked(self.client.put(&url).send().await).await?;
        tracing::info!(token = %model.token, admin_addr, "proxy brought online");
        Ok(())
    }
}
