/// Shardmon - health aggregation for the control plane of a sharded Redis cluster
///
/// The control plane periodically probes every data server, sentinel and
/// proxy of the cluster, each probe bounded by a deadline, and publishes
/// the per-endpoint outcomes as complete, cycle-consistent maps. Proxies
/// found stuck between online and closed are brought online automatically.
pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod health;
pub mod utils;

pub use config::Config;
pub use control::{ControlPlane, Monitor, Overview, ProxyStats, RedisStats, RefreshHandle, Transports};
pub use error::{MonitorError, MonitorResult, RemoteError};
pub use health::ProbeResult;

/// Wire the control plane described by `config`: seeded in-memory topology,
/// real RESP and HTTP transports, and the monitor that drives both cycles.
pub fn build_monitor(config: &Config) -> MonitorResult<Monitor> {
    let store = config.topology.build_store()?;
    let transports = Transports::from_config(&config.product, &config.health)?;
    let control = ControlPlane::new(store, transports);
    Ok(Monitor::new(control, config.health.clone()))
}
