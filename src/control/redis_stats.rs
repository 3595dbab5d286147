/// Data server and sentinel stats refresh
use super::{ControlPlane, RefreshHandle};
use crate::core::fanin::FanIn;
use crate::error::{MonitorResult, RemoteError};
use crate::health::{Inflight, ProbeResult, RedisReport, SentinelGroup};
use crate::utils::unix_now;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Latest probe outcome of a data server or sentinel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisStats {
    pub result: ProbeResult<RedisReport>,
    /// Unix seconds at which the probe finished
    pub unixtime: i64,
}

impl RedisStats {
    pub fn new(result: ProbeResult<RedisReport>) -> Self {
        Self {
            result,
            unixtime: unix_now(),
        }
    }

    pub fn info(&self) -> Option<&HashMap<String, String>> {
        self.result.stats().map(|report| &report.info)
    }

    /// Monitored groups, present only on sentinel entries
    pub fn sentinel(&self) -> Option<&HashMap<String, SentinelGroup>> {
        self.result.stats().and_then(|report| report.sentinel.as_ref())
    }
}

impl ControlPlane {
    /// Launch one refresh cycle over every data server and sentinel.
    ///
    /// Returns as soon as the probes are spawned. The snapshot is read under
    /// the control-plane lock; if it fails no probe is launched. Each probe
    /// is bounded by `timeout`, and the complete result map replaces the
    /// published one once every probe has reported.
    pub async fn refresh_redis_stats(
        &self,
        timeout: Duration,
    ) -> MonitorResult<RefreshHandle<RedisStats>> {
        let snapshot = self.snapshot().await?;

        let fanin = FanIn::new();
        let mut probes = Vec::with_capacity(snapshot.server_count() + snapshot.sentinel.servers.len());

        for addr in snapshot.server_addrs() {
            let transport = Arc::clone(&self.inner.transports.redis);
            let target = addr.to_string();
            probes.push(spawn_probe(
                &fanin,
                &self.inner.inflight.servers,
                addr,
                timeout,
                move || async move {
                    let info = transport.info_full(&target).await?;
                    Ok(RedisReport {
                        info,
                        sentinel: None,
                    })
                },
            ));
        }

        for addr in &snapshot.sentinel.servers {
            let transport = Arc::clone(&self.inner.transports.sentinel);
            let target = addr.clone();
            probes.push(spawn_probe(
                &fanin,
                &self.inner.inflight.sentinels,
                addr,
                timeout,
                move || async move { transport.sentinel_report(&target).await },
            ));
        }

        tracing::debug!(probes = probes.len(), ?timeout, "redis stats refresh launched");

        let publisher = self.spawn_publisher(&fanin, "redis", |state, results| {
            state.servers = results;
        });

        Ok(RefreshHandle {
            fanin,
            publisher,
            probes,
        })
    }
}

fn spawn_probe<F, Fut>(
    fanin: &FanIn<RedisStats>,
    inflight: &Inflight<RedisReport>,
    addr: &str,
    timeout: Duration,
    start: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<RedisReport, RemoteError>> + Send + 'static,
{
    fanin.add();
    let fanin = fanin.clone();
    let inflight = inflight.clone();
    let addr = addr.to_string();
    tokio::spawn(async move {
        let result = inflight.probe(&addr, timeout, start).await;
        if let ProbeResult::Error(err) = &result {
            tracing::debug!(addr = %addr, error = %err, "redis probe failed");
        }
        fanin.done(addr, RedisStats::new(result));
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::{info, transports, Behavior, Mocks, SharedStore};
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::core::{Group, Sentinel};
    use crate::error::MonitorError;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn three_groups_one_sentinel() -> MemoryStore {
        let mut store = MemoryStore::new();
        for gid in 1..=3 {
            store
                .upsert_group(
                    Group::new(gid)
                        .with_server(&format!("10.0.0.{}:6379", gid))
                        .with_server(&format!("10.0.1.{}:6379", gid)),
                )
                .unwrap();
        }
        store.set_sentinel(Sentinel::new(vec!["10.0.9.1:26379".to_string()]));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_server_and_sentinel_is_probed() {
        let mocks = Mocks::new();
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        let handle = control.refresh_redis_stats(TIMEOUT).await.unwrap();
        assert_eq!(handle.probe_count(), 7);
        let published = handle.wait().await.unwrap();

        assert_eq!(published.len(), 7);
        assert_eq!(mocks.redis.calls().len(), 6);
        assert_eq!(mocks.sentinel.calls(), vec!["10.0.9.1:26379"]);

        let server = &published["10.0.0.2:6379"];
        assert_eq!(server.info().unwrap()["addr"], "10.0.0.2:6379");
        assert!(server.sentinel().is_none());
        assert!(published["10.0.9.1:26379"].sentinel().is_some());

        // the control plane now serves the same map
        assert!(Arc::ptr_eq(&published, &control.redis_stats().await));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_targets_publishes_empty_map() {
        let mocks = Mocks::new();
        let control = ControlPlane::new(MemoryStore::new(), transports(&mocks));

        let handle = control.refresh_redis_stats(TIMEOUT).await.unwrap();
        assert_eq!(handle.probe_count(), 0);
        let published = tokio::time::timeout(Duration::from_millis(10), handle.wait())
            .await
            .expect("empty cycle completes immediately")
            .unwrap();
        assert!(published.is_empty());
        assert!(control.redis_stats().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_launches_nothing() {
        let mocks = Mocks::new();
        let mut store = three_groups_one_sentinel();
        store.fail_snapshots(Some("coordinator unreachable".to_string()));
        let control = ControlPlane::new(store, transports(&mocks));

        let err = control.refresh_redis_stats(TIMEOUT).await.err().unwrap();
        assert!(matches!(err, MonitorError::Snapshot { .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(mocks.redis.calls().is_empty());
        assert!(mocks.sentinel.calls().is_empty());
        assert!(control.redis_stats().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_are_recorded_per_address() {
        let mocks = Mocks::new();
        mocks.redis.set("10.0.0.1:6379", Behavior::Hang);
        mocks.redis.set("10.0.1.1:6379", Behavior::Fail("ERR max clients reached".into()));
        mocks.redis.set(
            "10.0.0.2:6379",
            Behavior::Delay(Duration::from_millis(300), info("10.0.0.2:6379")),
        );
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        let started = tokio::time::Instant::now();
        let published = control
            .refresh_redis_stats(TIMEOUT)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        // bounded by the deadline, not by the hung server
        assert!(started.elapsed() >= TIMEOUT);
        assert!(started.elapsed() < TIMEOUT * 2);

        assert!(published["10.0.0.1:6379"].result.is_timeout());
        assert_eq!(
            published["10.0.1.1:6379"].result.error().unwrap().cause,
            "ERR max clients reached"
        );
        assert!(published["10.0.0.2:6379"].result.is_ok());
        assert!(published["10.0.0.3:6379"].result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_returns_before_probes_finish() {
        let mocks = Mocks::new();
        mocks.redis.set_default(Behavior::Hang);
        mocks.sentinel.set_default(Behavior::Hang);
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        let handle = control.refresh_redis_stats(TIMEOUT).await.unwrap();
        assert_eq!(handle.pending(), 7);
        assert!(control.redis_stats().await.is_empty());

        let published = handle.wait().await.unwrap();
        assert!(published.values().all(|s| s.result.is_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_map_is_replaced_wholesale() {
        let mocks = Mocks::new();
        let store = SharedStore::new(three_groups_one_sentinel());
        let control = ControlPlane::new(store.clone(), transports(&mocks));

        control.refresh_redis_stats(TIMEOUT).await.unwrap().wait().await.unwrap();
        assert!(control.redis_stats_for("10.0.0.3:6379").await.is_some());

        store.update(|s| {
            s.remove_group(3);
        });
        control.refresh_redis_stats(TIMEOUT).await.unwrap().wait().await.unwrap();

        let stats = control.redis_stats().await;
        assert_eq!(stats.len(), 5);
        assert!(control.redis_stats_for("10.0.0.3:6379").await.is_none());
        assert!(control.redis_stats_for("10.0.1.3:6379").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_never_mix() {
        let mocks = Mocks::new();
        for (i, addr) in ["10.0.0.1:6379", "10.0.0.2:6379", "10.0.0.3:6379"].iter().enumerate() {
            mocks.redis.set(
                addr,
                Behavior::Delay(Duration::from_millis(100 * (i as u64 + 1)), info(addr)),
            );
        }
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        let first = control.refresh_redis_stats(TIMEOUT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = control.refresh_redis_stats(TIMEOUT).await.unwrap();

        let reader = {
            let control = control.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.push(control.redis_stats().await);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                seen
            })
        };

        let first = first.wait().await.unwrap();
        let second = second.wait().await.unwrap();
        let seen = reader.await.unwrap();

        // every observed map is exactly one cycle's output
        for map in &seen {
            assert!(
                map.is_empty() || Arc::ptr_eq(map, &first) || Arc::ptr_eq(map, &second),
                "observed a map no cycle published"
            );
        }
        let last = control.redis_stats().await;
        assert!(Arc::ptr_eq(&last, &first) || Arc::ptr_eq(&last, &second));
        assert_eq!(last.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_server_holds_one_call_across_cycles() {
        let mocks = Mocks::new();
        mocks.redis.set("10.0.0.1:6379", Behavior::Hang);
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        for _ in 0..5 {
            let published = control
                .refresh_redis_stats(TIMEOUT)
                .await
                .unwrap()
                .wait()
                .await
                .unwrap();
            assert!(published["10.0.0.1:6379"].result.is_timeout());
        }

        let hung_calls = mocks
            .redis
            .calls()
            .iter()
            .filter(|addr| *addr == "10.0.0.1:6379")
            .count();
        assert_eq!(hung_calls, 1);
        // healthy servers are probed every cycle
        assert_eq!(mocks.redis.calls().len(), 1 + 5 * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_stays_out_of_next_cycle() {
        let mocks = Mocks::new();
        mocks.redis.set(
            "10.0.0.1:6379",
            Behavior::Delay(Duration::from_millis(1500), info("from-cycle-1")),
        );
        let control = ControlPlane::new(three_groups_one_sentinel(), transports(&mocks));

        let first = control.refresh_redis_stats(TIMEOUT).await.unwrap().wait().await.unwrap();
        assert!(first["10.0.0.1:6379"].result.is_timeout());

        mocks.redis.set("10.0.0.1:6379", Behavior::Reply(info("fresh")));
        let second = control.refresh_redis_stats(TIMEOUT).await.unwrap().wait().await.unwrap();

        assert_eq!(second["10.0.0.1:6379"].info().unwrap()["addr"], "fresh");
        let calls = mocks
            .redis
            .calls()
            .iter()
            .filter(|addr| *addr == "10.0.0.1:6379")
            .count();
        assert_eq!(calls, 2);
        assert!(Arc::ptr_eq(&second, &control.redis_stats().await));
    }

    #[test]
    fn test_stats_serialization() {
        let stats = RedisStats {
            result: ProbeResult::Timeout,
            unixtime: 1_700_000_000,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["unixtime"], 1_700_000_000);
        assert_eq!(json["result"], "timeout");
    }
}
