/// Proxy stats refresh and the auto-online reaction
use super::{ControlPlane, RefreshHandle};
use crate::core::fanin::FanIn;
use crate::core::Proxy;
use crate::error::MonitorResult;
use crate::health::{probe_with_deadline, ProbeResult, ProxyAdmin, ProxyStatsPayload};
use crate::utils::unix_now;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Latest probe outcome of a proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub result: ProbeResult<ProxyStatsPayload>,
    /// Unix seconds at which the probe finished
    pub unixtime: i64,
}

impl ProxyStats {
    pub fn new(result: ProbeResult<ProxyStatsPayload>) -> Self {
        Self {
            result,
            unixtime: unix_now(),
        }
    }

    /// True only for a proxy that answered and reports neither online nor closed
    pub fn needs_online(&self) -> bool {
        self.result
            .stats()
            .is_some_and(ProxyStatsPayload::needs_online)
    }
}

impl ControlPlane {
    /// Launch one refresh cycle over every registered proxy.
    ///
    /// Results are keyed by proxy token. A proxy that answers but is neither
    /// online nor closed is sent an online command from its own probe task,
    /// after its result has been reported and within the same `timeout`.
    pub async fn refresh_proxy_stats(
        &self,
        timeout: Duration,
    ) -> MonitorResult<RefreshHandle<ProxyStats>> {
        let snapshot = self.snapshot().await?;
        let auto_online = self.auto_online();

        let fanin = FanIn::new();
        let mut probes = Vec::with_capacity(snapshot.proxies.len());

        for proxy in snapshot.proxies {
            fanin.add();
            let fanin = fanin.clone();
            let inflight = self.inner.inflight.proxies.clone();
            let transport = Arc::clone(&self.inner.transports.proxy);
            let admin = Arc::clone(&self.inner.transports.admin);

            probes.push(tokio::spawn(async move {
                let target = proxy.clone();
                let result = inflight
                    .probe(&proxy.token, timeout, move || async move {
                        transport.stats_simple(&target).await
                    })
                    .await;
                let stats = ProxyStats::new(result);
                let needs_online = auto_online && stats.needs_online();
                fanin.done(proxy.token.clone(), stats);

                if needs_online {
                    bring_online(admin, &proxy, timeout).await;
                }
            }));
        }

        tracing::debug!(probes = probes.len(), ?timeout, "proxy stats refresh launched");

        let publisher = self.spawn_publisher(&fanin, "proxy", |state, results| {
            state.proxies = results;
        });

        Ok(RefreshHandle {
            fanin,
            publisher,
            probes,
        })
    }
}

/// Send the online command; failures are logged and go no further
async fn bring_online(admin: Arc<dyn ProxyAdmin>, proxy: &Proxy, timeout: Duration) {
    let admin_addr = proxy.admin_addr.clone();
    let outcome = probe_with_deadline(timeout, async move { admin.online(&admin_addr).await }).await;
    match outcome {
        ProbeResult::Stats(()) => {
            tracing::info!(token = %proxy.token, admin_addr = %proxy.admin_addr, "auto online proxy");
        }
        ProbeResult::Error(err) => {
            tracing::warn!(
                token = %proxy.token,
                admin_addr = %proxy.admin_addr,
                error = %err,
                "auto online proxy failed"
            );
        }
        ProbeResult::Timeout => {
            tracing::warn!(
                token = %proxy.token,
                admin_addr = %proxy.admin_addr,
                ?timeout,
                "auto online proxy failed: timed out"
            );
        }
    }
}
