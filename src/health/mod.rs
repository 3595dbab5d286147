/// Health probing for data servers, sentinels and proxies
pub mod probe;
pub mod proxy;
pub mod redis;
pub mod resp;

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use probe::{probe_with_deadline, Inflight};
pub use proxy::{HttpProxyClient, ProxyAdmin, ProxyStatsPayload, ProxyTransport};
pub use redis::{RedisReport, RedisTransport, RespClient, SentinelGroup, SentinelTransport};

/// Outcome of one probe. Exactly one of the three states holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult<T> {
    /// The endpoint answered before the deadline
    Stats(T),
    /// The endpoint failed before the deadline
    Error(RemoteError),
    /// The deadline fired first
    Timeout,
}

impl<T> ProbeResult<T> {
    pub fn stats(&self) -> Option<&T> {
        match self {
            ProbeResult::Stats(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            ProbeResult::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeResult::Timeout)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeResult::Stats(_))
    }
}

impl<T> From<Result<T, RemoteError>> for ProbeResult<T> {
    fn from(result: Result<T, RemoteError>) -> Self {
        match result {
            Ok(stats) => ProbeResult::Stats(stats),
            Err(err) => ProbeResult::Error(err),
        }
    }
}

impl<T> fmt::Display for ProbeResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Stats(_) => write!(f, "Ok"),
            ProbeResult::Error(err) => write!(f, "Error: {}", err),
            ProbeResult::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Tally of probe outcomes for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub ok: usize,
    pub error: usize,
    pub timeout: usize,
}

impl ProbeSummary {
    pub fn tally<'a, T: 'a>(results: impl IntoIterator<Item = &'a ProbeResult<T>>) -> Self {
        results
            .into_iter()
            .fold(ProbeSummary::default(), |mut summary, result| {
                match result {
                    ProbeResult::Stats(_) => summary.ok += 1,
                    ProbeResult::Error(_) => summary.error += 1,
                    ProbeResult::Timeout => summary.timeout += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.ok + self.error + self.timeout
    }
}
