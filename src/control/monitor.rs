/// Periodic refresh driver
use super::{ControlPlane, Overview, ProxyStats, RedisStats, RefreshHandle};
use crate::config::HealthConfig;
use crate::error::MonitorResult;
use crate::health::{ProbeResult, ProbeSummary};
use crate::utils::format_duration;
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Drives both refresh cycles on their own tickers.
///
/// Each tick launches a cycle and moves on without waiting for it, so a
/// slow cycle never delays the next tick and cycles may overlap.
pub struct Monitor {
    control: ControlPlane,
    health: HealthConfig,
}

impl Monitor {
    pub fn new(control: ControlPlane, health: HealthConfig) -> Self {
        control.set_auto_online(health.auto_online);
        Self { control, health }
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    /// Run until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut redis_ticker = time::interval(self.health.redis_interval());
        redis_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut proxy_ticker = time::interval(self.health.proxy_interval());
        proxy_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            redis_interval = %format_duration(self.health.redis_interval()),
            proxy_interval = %format_duration(self.health.proxy_interval()),
            probe_timeout = %format_duration(self.health.probe_timeout()),
            auto_online = self.health.auto_online,
            "stats monitor started"
        );

        loop {
            tokio::select! {
                _ = redis_ticker.tick() => self.launch_redis_cycle().await,
                _ = proxy_ticker.tick() => self.launch_proxy_cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("stats monitor stopped");
    }

    /// Run one cycle of each kind to completion and return the overview
    pub async fn run_once(&self) -> MonitorResult<Overview> {
        let timeout = self.health.probe_timeout();
        let redis = self.control.refresh_redis_stats(timeout).await?;
        let proxy = self.control.refresh_proxy_stats(timeout).await?;
        let (redis, proxy) = tokio::join!(redis.wait(), proxy.wait());
        redis?;
        proxy?;
        self.control.overview().await
    }

    async fn launch_redis_cycle(&self) {
        match self
            .control
            .refresh_redis_stats(self.health.probe_timeout())
            .await
        {
            Ok(handle) => {
                tokio::spawn(log_summary("redis", handle, |s: &RedisStats| &s.result));
            }
            Err(e) => {
                tracing::warn!(error = %e, severity = %e.severity(), "redis stats refresh skipped");
            }
        }
    }

    async fn launch_proxy_cycle(&self) {
        match self
            .control
            .refresh_proxy_stats(self.health.probe_timeout())
            .await
        {
            Ok(handle) => {
                tokio::spawn(log_summary("proxy", handle, |s: &ProxyStats| &s.result));
            }
            Err(e) => {
                tracing::warn!(error = %e, severity = %e.severity(), "proxy stats refresh skipped");
            }
        }
    }
}

async fn log_summary<V, T>(
    kind: &'static str,
    handle: RefreshHandle<V>,
    result: fn(&V) -> &ProbeResult<T>,
) where
    V: Clone,
{
    let started = Instant::now();
    match handle.wait().await {
        Ok(stats) => {
            let summary = summarize(&stats, result);
            tracing::debug!(
                kind,
                ok = summary.ok,
                error = summary.error,
                timeout = summary.timeout,
                elapsed = %format_duration(started.elapsed()),
                "stats cycle finished"
            );
        }
        Err(e) => tracing::error!(kind, error = %e, "stats cycle failed"),
    }
}

fn summarize<V, T>(stats: &HashMap<String, V>, result: fn(&V) -> &ProbeResult<T>) -> ProbeSummary {
    ProbeSummary::tally(stats.values().map(result))
}

/// Shutdown channel for [`Monitor::run`]
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{transports, Behavior, Mocks};
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::core::{Group, Proxy};
    use crate::health::ProxyStatsPayload;
    use std::time::Duration;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .upsert_group(Group::new(1).with_server("a:6379").with_server("b:6379"))
            .unwrap();
        store.add_proxy(Proxy::new("t1", "p:11080")).unwrap();
        store
    }

    fn health(auto_online: bool) -> HealthConfig {
        HealthConfig {
            redis_interval_sec: 1,
            proxy_interval_sec: 2,
            probe_timeout_ms: 500,
            auto_online,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_until_shutdown() {
        let mocks = Mocks::new();
        let monitor = Monitor::new(ControlPlane::new(store(), transports(&mocks)), health(true));
        let (tx, rx) = shutdown_channel();

        let stopper = tokio::spawn(async move {
            time::sleep(Duration::from_millis(4500)).await;
            tx.send(true).unwrap();
        });
        monitor.run(rx).await;
        stopper.await.unwrap();

        // ticks at 0s..4s
        assert_eq!(mocks.redis.calls().len(), 2 * 5);
        // ticks at 0s, 2s and 4s
        assert_eq!(mocks.proxy.calls().len(), 3);
        assert_eq!(monitor.control().redis_stats().await.len(), 2);
        assert_eq!(monitor.control().proxy_stats().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_sender_dropped() {
        let monitor = Monitor::new(
            ControlPlane::new(store(), transports(&Mocks::new())),
            health(true),
        );
        let (tx, rx) = shutdown_channel();
        drop(tx);
        time::timeout(Duration::from_secs(1), monitor.run(rx))
            .await
            .expect("monitor stops once the sender is gone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_do_not_block_ticks() {
        let mocks = Mocks::new();
        mocks.redis.set_default(Behavior::Hang);
        let monitor = Monitor::new(ControlPlane::new(store(), transports(&mocks)), health(true));
        let (tx, rx) = shutdown_channel();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(3500)).await;
            tx.send(true).unwrap();
        });
        monitor.run(rx).await;

        // one abandoned call per hung server, every cycle still published
        assert_eq!(mocks.redis.calls().len(), 2);
        let stats = monitor.control().redis_stats().await;
        assert!(stats.values().all(|s| s.result.is_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_applies_auto_online_setting() {
        let mocks = Mocks::new();
        mocks
            .proxy
            .set_default(Behavior::Reply(ProxyStatsPayload::new(false, false)));
        let monitor = Monitor::new(ControlPlane::new(store(), transports(&mocks)), health(false));

        let overview = monitor.run_once().await.unwrap();
        assert_eq!(overview.servers, 2);
        assert_eq!(overview.redis_stats.len(), 2);
        assert!(overview.proxy_stats["t1"].needs_online());
        assert!(mocks.admin.calls().is_empty());
    }

    #[test]
    fn test_summarize() {
        let stats = HashMap::from([
            ("a".to_string(), RedisStats::new(ProbeResult::Timeout)),
            ("b".to_string(), RedisStats::new(ProbeResult::Stats(Default::default()))),
        ]);
        let summary = summarize(&stats, |s: &RedisStats| &s.result);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.timeout, 1);
    }
}
