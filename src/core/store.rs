/// Topology snapshot interface and the in-memory store
use super::{Group, Proxy, Sentinel, MAX_GROUP_ID};
use crate::error::{MonitorError, MonitorResult};
use std::collections::BTreeMap;

/// Point-in-time copy of the cluster topology used to plan one cycle
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub groups: Vec<Group>,
    pub sentinel: Sentinel,
    pub proxies: Vec<Proxy>,
}

impl Snapshot {
    /// Every data server address, in group order
    pub fn server_addrs(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.servers.iter().map(|s| s.addr.as_str()))
    }

    pub fn server_count(&self) -> usize {
        self.groups.iter().map(|g| g.servers.len()).sum()
    }
}

/// Source of topology snapshots.
///
/// Called with the control-plane lock held, so implementations must return
/// quickly and must not perform network I/O.
pub trait TopologyStore: Send {
    fn snapshot(&self) -> MonitorResult<Snapshot>;
}

/// Topology kept in process memory, seeded from configuration
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: BTreeMap<i32, Group>,
    sentinel: Sentinel,
    proxies: BTreeMap<String, Proxy>,
    failing: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group
    pub fn upsert_group(&mut self, group: Group) -> MonitorResult<()> {
        if group.id <= 0 || group.id > MAX_GROUP_ID {
            return Err(MonitorError::topology(format!(
                "invalid group id {}, must be in 1..={}",
                group.id, MAX_GROUP_ID
            )));
        }
        self.groups.insert(group.id, group);
        Ok(())
    }

    pub fn remove_group(&mut self, id: i32) -> Option<Group> {
        self.groups.remove(&id)
    }

    /// Register a proxy; tokens must be unique
    pub fn add_proxy(&mut self, proxy: Proxy) -> MonitorResult<()> {
        if proxy.token.is_empty() {
            return Err(MonitorError::topology("proxy token cannot be empty"));
        }
        if self.proxies.contains_key(&proxy.token) {
            return Err(MonitorError::topology(format!(
                "proxy-[{}] already exists",
                proxy.token
            )));
        }
        self.proxies.insert(proxy.token.clone(), proxy);
        Ok(())
    }

    pub fn remove_proxy(&mut self, token: &str) -> Option<Proxy> {
        self.proxies.remove(token)
    }

    pub fn set_sentinel(&mut self, sentinel: Sentinel) {
        self.sentinel = sentinel;
    }

    /// Make every following snapshot fail with `reason`, or clear with `None`
    pub fn fail_snapshots(&mut self, reason: Option<String>) {
        self.failing = reason;
    }
}

impl TopologyStore for MemoryStore {
    fn snapshot(&self) -> MonitorResult<Snapshot> {
        if let Some(reason) = &self.failing {
            return Err(MonitorError::snapshot(reason.clone()));
        }
        Ok(Snapshot {
            groups: self.groups.values().cloned().collect(),
            sentinel: self.sentinel.clone(),
            proxies: self.proxies.values().cloned().collect(),
        })
    }
}
