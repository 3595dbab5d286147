/// Control plane: topology snapshots, stats refresh cycles and published views
///
/// A refresh cycle reads a snapshot under the control-plane lock, releases
/// it, fans out one probe task per endpoint and hands back a
/// [`RefreshHandle`]. A publisher task waits for the fan-in and swaps the
/// complete result map into the shared state under the same lock. The lock
/// is never held across probe I/O or the fan-in wait.
///
/// Cycles may overlap. There is no generation check: whichever cycle
/// publishes last wins, and because every publish swaps a whole
/// `Arc<HashMap>`, readers never see entries of two cycles mixed.
pub mod monitor;
pub mod proxy_stats;
pub mod redis_stats;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::{HealthConfig, ProductConfig};
use crate::core::fanin::FanIn;
use crate::core::store::{Snapshot, TopologyStore};
use crate::error::{MonitorError, MonitorResult};
use crate::health::{
    HttpProxyClient, Inflight, ProxyAdmin, ProxyStatsPayload, ProxyTransport, RedisReport,
    RedisTransport, RespClient, SentinelTransport,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use monitor::Monitor;
pub use proxy_stats::ProxyStats;
pub use redis_stats::RedisStats;

/// The remote capabilities a control plane probes through
#[derive(Clone)]
pub struct Transports {
    pub redis: Arc<dyn RedisTransport>,
    pub sentinel: Arc<dyn SentinelTransport>,
    pub proxy: Arc<dyn ProxyTransport>,
    pub admin: Arc<dyn ProxyAdmin>,
}

impl Transports {
    /// RESP client for data servers and sentinels, HTTP client for proxies
    pub fn from_config(product: &ProductConfig, health: &HealthConfig) -> MonitorResult<Self> {
        let resp = Arc::new(
            RespClient::new(&product.name, &product.auth).with_timeout(health.probe_timeout()),
        );
        let http = Arc::new(HttpProxyClient::new(&product.name, &product.auth)?);
        Ok(Self {
            redis: resp.clone(),
            sentinel: resp,
            proxy: http.clone(),
            admin: http,
        })
    }
}

/// State guarded by the control-plane lock
pub(crate) struct ControlState {
    store: Box<dyn TopologyStore>,
    servers: Arc<HashMap<String, RedisStats>>,
    proxies: Arc<HashMap<String, ProxyStats>>,
}

/// Background calls per transport kind, keyed by target
struct InflightCalls {
    servers: Inflight<RedisReport>,
    sentinels: Inflight<RedisReport>,
    proxies: Inflight<ProxyStatsPayload>,
}

struct Inner {
    state: Mutex<ControlState>,
    transports: Transports,
    inflight: InflightCalls,
    auto_online: AtomicBool,
}

/// Cloneable handle to the control plane
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<Inner>,
}

/// Topology counts together with both published stats maps
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub groups: usize,
    pub servers: usize,
    pub sentinels: usize,
    pub proxies: usize,
    pub redis_stats: Arc<HashMap<String, RedisStats>>,
    pub proxy_stats: Arc<HashMap<String, ProxyStats>>,
}

/// Handle to a launched refresh cycle.
///
/// Dropping it leaves the cycle running to completion in the background.
pub struct RefreshHandle<V> {
    fanin: FanIn<V>,
    publisher: JoinHandle<Arc<HashMap<String, V>>>,
    probes: Vec<JoinHandle<()>>,
}

impl<V> RefreshHandle<V> {
    /// Number of probes launched by this cycle
    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Number of probes that have not reported yet
    pub fn pending(&self) -> usize {
        self.fanin.pending()
    }

    /// Wait until the cycle has published its map and every probe task,
    /// including follow-up reactions, has ended. Returns the published map.
    pub async fn wait(self) -> MonitorResult<Arc<HashMap<String, V>>> {
        let published = self
            .publisher
            .await
            .map_err(|e| MonitorError::internal(format!("stats publisher failed: {}", e)))?;
        for probe in self.probes {
            probe
                .await
                .map_err(|e| MonitorError::internal(format!("probe task failed: {}", e)))?;
        }
        Ok(published)
    }
}

impl ControlPlane {
    pub fn new(store: impl TopologyStore + 'static, transports: Transports) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ControlState {
                    store: Box::new(store),
                    servers: Arc::new(HashMap::new()),
                    proxies: Arc::new(HashMap::new()),
                }),
                transports,
                inflight: InflightCalls {
                    servers: Inflight::new(),
                    sentinels: Inflight::new(),
                    proxies: Inflight::new(),
                },
                auto_online: AtomicBool::new(true),
            }),
        }
    }

    /// Enable or disable bringing stuck proxies online after a probe
    pub fn set_auto_online(&self, enabled: bool) {
        self.inner.auto_online.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_online(&self) -> bool {
        self.inner.auto_online.load(Ordering::Relaxed)
    }

    /// Read a topology snapshot, holding the lock only for the read
    pub async fn snapshot(&self) -> MonitorResult<Snapshot> {
        let state = self.inner.state.lock().await;
        state.store.snapshot()
    }

    /// Currently published data server and sentinel stats, keyed by address
    pub async fn redis_stats(&self) -> Arc<HashMap<String, RedisStats>> {
        Arc::clone(&self.inner.state.lock().await.servers)
    }

    /// Currently published proxy stats, keyed by proxy token
    pub async fn proxy_stats(&self) -> Arc<HashMap<String, ProxyStats>> {
        Arc::clone(&self.inner.state.lock().await.proxies)
    }

    pub async fn redis_stats_for(&self, addr: &str) -> Option<RedisStats> {
        self.redis_stats().await.get(addr).cloned()
    }

    pub async fn proxy_stats_for(&self, token: &str) -> Option<ProxyStats> {
        self.proxy_stats().await.get(token).cloned()
    }

    pub async fn overview(&self) -> MonitorResult<Overview> {
        let state = self.inner.state.lock().await;
        let snapshot = state.store.snapshot()?;
        Ok(Overview {
            groups: snapshot.groups.len(),
            servers: snapshot.server_count(),
            sentinels: snapshot.sentinel.servers.len(),
            proxies: snapshot.proxies.len(),
            redis_stats: Arc::clone(&state.servers),
            proxy_stats: Arc::clone(&state.proxies),
        })
    }

    /// Spawn the task that waits for `fanin` and publishes its results
    fn spawn_publisher<V, F>(
        &self,
        fanin: &FanIn<V>,
        kind: &'static str,
        publish: F,
    ) -> JoinHandle<Arc<HashMap<String, V>>>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce(&mut ControlState, Arc<HashMap<String, V>>) + Send + 'static,
    {
        let fanin = fanin.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let results = Arc::new(fanin.wait().await);
            let mut state = inner.state.lock().await;
            publish(&mut state, Arc::clone(&results));
            tracing::debug!(kind, entries = results.len(), "stats published");
            results
        })
    }
}
