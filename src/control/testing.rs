//! Scripted transports and a mutable store for control-plane tests
use super::Transports;
use crate::core::store::{MemoryStore, Snapshot, TopologyStore};
use crate::core::Proxy;
use crate::error::{MonitorResult, RemoteError};
use crate::health::{
    ProxyAdmin, ProxyStatsPayload, ProxyTransport, RedisReport, RedisTransport, SentinelTransport,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a mocked endpoint answers
#[derive(Debug, Clone)]
pub(crate) enum Behavior<T> {
    Reply(T),
    Fail(String),
    Hang,
    Delay(Duration, T),
}

/// Reply used when no behavior was scripted for a key
pub(crate) trait Canned: Clone + Send + Sync + 'static {
    fn canned(key: &str) -> Self;
}

pub(crate) fn info(addr: &str) -> HashMap<String, String> {
    HashMap::from([
        ("addr".to_string(), addr.to_string()),
        ("role".to_string(), "master".to_string()),
    ])
}

impl Canned for HashMap<String, String> {
    fn canned(key: &str) -> Self {
        info(key)
    }
}

impl Canned for RedisReport {
    fn canned(key: &str) -> Self {
        RedisReport {
            info: info(key),
            sentinel: Some(HashMap::new()),
        }
    }
}

impl Canned for ProxyStatsPayload {
    fn canned(_: &str) -> Self {
        ProxyStatsPayload::new(true, false)
    }
}

impl Canned for () {
    fn canned(_: &str) -> Self {}
}

/// Endpoint that records every call and answers from a script
pub(crate) struct MockEndpoint<T> {
    behaviors: Mutex<HashMap<String, Behavior<T>>>,
    fallback: Mutex<Option<Behavior<T>>>,
    calls: Mutex<Vec<String>>,
}

impl<T: Canned> MockEndpoint<T> {
    fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            fallback: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set(&self, key: &str, behavior: Behavior<T>) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(key.to_string(), behavior);
    }

    pub(crate) fn set_default(&self, behavior: Behavior<T>) {
        *self.fallback.lock().unwrap() = Some(behavior);
    }

    /// Keys of every call started so far, in order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, key: &str) -> Result<T, RemoteError> {
        self.calls.lock().unwrap().push(key.to_string());
        let scripted = self.behaviors.lock().unwrap().get(key).cloned();
        let behavior = scripted.or_else(|| self.fallback.lock().unwrap().clone());
        match behavior {
            None => Ok(T::canned(key)),
            Some(Behavior::Reply(value)) => Ok(value),
            Some(Behavior::Fail(cause)) => Err(RemoteError::new(cause)),
            Some(Behavior::Hang) => futures::future::pending().await,
            Some(Behavior::Delay(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl RedisTransport for MockEndpoint<HashMap<String, String>> {
    async fn info_full(&self, addr: &str) -> Result<HashMap<String, String>, RemoteError> {
        self.respond(addr).await
    }
}

#[async_trait]
impl SentinelTransport for MockEndpoint<RedisReport> {
    async fn sentinel_report(&self, addr: &str) -> Result<RedisReport, RemoteError> {
        self.respond(addr).await
    }
}

/// Keyed by proxy token
#[async_trait]
impl ProxyTransport for MockEndpoint<ProxyStatsPayload> {
    async fn stats_simple(&self, proxy: &Proxy) -> Result<ProxyStatsPayload, RemoteError> {
        self.respond(&proxy.token).await
    }
}

/// Keyed by admin address
#[async_trait]
impl ProxyAdmin for MockEndpoint<()> {
    async fn online(&self, admin_addr: &str) -> Result<(), RemoteError> {
        self.respond(admin_addr).await
    }
}

/// One scripted endpoint per transport kind
pub(crate) struct Mocks {
    pub(crate) redis: Arc<MockEndpoint<HashMap<String, String>>>,
    pub(crate) sentinel: Arc<MockEndpoint<RedisReport>>,
    pub(crate) proxy: Arc<MockEndpoint<ProxyStatsPayload>>,
    pub(crate) admin: Arc<MockEndpoint<()>>,
}

impl Mocks {
    pub(crate) fn new() -> Self {
        Self {
            redis: Arc::new(MockEndpoint::new()),
            sentinel: Arc::new(MockEndpoint::new()),
            proxy: Arc::new(MockEndpoint::new()),
            admin: Arc::new(MockEndpoint::new()),
        }
    }
}

pub(crate) fn transports(mocks: &Mocks) -> Transports {
    Transports {
        redis: mocks.redis.clone(),
        sentinel: mocks.sentinel.clone(),
        proxy: mocks.proxy.clone(),
        admin: mocks.admin.clone(),
    }
}

/// Store that tests can keep mutating after handing it to a control plane
#[derive(Clone)]
pub(crate) struct SharedStore(Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut MemoryStore)) {
        f(&mut self.0.lock().unwrap());
    }
}

impl TopologyStore for SharedStore {
    fn snapshot(&self) -> MonitorResult<Snapshot> {
        self.0.lock().unwrap().snapshot()
    }
}
