/// Data server and sentinel probe transports
///
/// [`RespClient`] speaks RESP over a short-lived TCP connection per call.
/// Connecting and each read are bounded by the client timeout and a reply
/// may not grow past [`MAX_REPLY_BYTES`]; the overall deadline belongs to
/// the probe.

use super::resp::{RespEncoder, RespParser, RespValue};
use crate::core::MAX_GROUP_ID;
use crate::error::RemoteError;
use async_trait::async_trait;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Largest reply buffered for a single command
pub const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;

/// Master and replicas of one group, as seen by a sentinel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelGroup {
    pub master: HashMap<String, String>,
    #[serde(default)]
    pub slaves: Vec<HashMap<String, String>>,
}

/// Diagnostic report of a data server or sentinel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedisReport {
    pub info: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<HashMap<String, SentinelGroup>>,
}

/// Fetches the full diagnostic report of a data server
#[async_trait]
pub trait RedisTransport: Send + Sync {
    async fn info_full(&self, addr: &str) -> Result<HashMap<String, String>, RemoteError>;
}

/// Fetches a sentinel's own report and its per-group master/replica view
#[async_trait]
pub trait SentinelTransport: Send + Sync {
    async fn sentinel_report(&self, addr: &str) -> Result<RedisReport, RemoteError>;
}

/// RESP client for data servers and sentinels
#[derive(Debug, Clone)]
pub struct RespClient {
    product_name: String,
    auth: Option<String>,
    timeout: Duration,
    max_reply_bytes: usize,
}

/// One open RESP connection
pub struct RespConnection {
    stream: TcpStream,
    buf: BytesMut,
    read_timeout: Duration,
    max_reply_bytes: usize,
}

impl RespClient {
    pub fn new(product_name: &str, auth: &str) -> Self {
        Self {
            product_name: product_name.to_string(),
            auth: (!auth.is_empty()).then(|| auth.to_string()),
            timeout: Duration::from_secs(1),
            max_reply_bytes: MAX_REPLY_BYTES,
        }
    }

    /// Bound connecting and every read by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_reply_bytes(mut self, max_reply_bytes: usize) -> Self {
        self.max_reply_bytes = max_reply_bytes;
        self
    }

    /// Open a connection to `addr`, authenticating when configured
    pub async fn connect(&self, addr: &str) -> Result<RespConnection, RemoteError> {
        let stream = match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(RemoteError::new(format!("connect {} failed: {}", addr, e)));
            }
            Err(_) => {
                return Err(RemoteError::new(format!("connect {} timed out", addr)));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr, error = %e, "failed to set TCP_NODELAY");
        }

        let mut conn = RespConnection {
            stream,
            buf: BytesMut::with_capacity(16 * 1024),
            read_timeout: self.timeout,
            max_reply_bytes: self.max_reply_bytes,
        };
        if let Some(auth) = &self.auth {
            conn.call("AUTH", &[auth.as_str()]).await?;
        }
        Ok(conn)
    }

    /// Group id of a sentinel master named `<product>-<gid>`
    fn master_gid(&self, name: &str) -> Option<i32> {
        name.strip_prefix(&self.product_name)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|gid| gid.parse::<i32>().ok())
            .filter(|&gid| gid > 0 && gid <= MAX_GROUP_ID)
    }
}

impl RespConnection {
    /// Send one command and read its reply; error replies become `RemoteError`
    pub async fn call(&mut self, command: &str, args: &[&str]) -> Result<RespValue, RemoteError> {
        let request = RespEncoder::encode(&RespEncoder::create_command(command, args));
        self.stream.write_all(&request).await?;

        loop {
            let parsed = RespParser::parse(&mut self.buf)
                .map_err(|e| RemoteError::new(format!("bad reply to {}: {}", command, e)))?;
            match parsed {
                Some(RespValue::Error(message)) => return Err(RemoteError::new(message)),
                Some(value) => return Ok(value),
                None => {}
            }
            if self.buf.len() > self.max_reply_bytes {
                return Err(RemoteError::new(format!(
                    "reply to {} exceeds {} bytes",
                    command, self.max_reply_bytes
                )));
            }
            match timeout(self.read_timeout, self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => return Err(RemoteError::new("connection closed by peer")),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(RemoteError::new(format!("reply to {} timed out", command)));
                }
            }
        }
    }

    async fn info(&mut self) -> Result<HashMap<String, String>, RemoteError> {
        let reply = self.call("INFO", &[]).await?;
        let text = reply
            .as_text()
            .ok_or_else(|| RemoteError::new(format!("invalid INFO reply: {:?}", reply)))?;
        Ok(parse_info(&text))
    }

    async fn sentinel_table(&mut self, args: &[&str]) -> Result<Vec<HashMap<String, String>>, RemoteError> {
        let reply = self.call("SENTINEL", args).await?;
        let rows = reply
            .as_array()
            .ok_or_else(|| RemoteError::new(format!("invalid SENTINEL {} reply", args[0])))?;
        rows.iter()
            .map(|row| {
                row.as_pairs()
                    .map(|pairs| pairs.into_iter().collect())
                    .ok_or_else(|| RemoteError::new(format!("invalid SENTINEL {} row", args[0])))
            })
            .collect()
    }
}

/// Parse `INFO` output into key/value pairs, skipping section headers
pub fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl RedisTransport for RespClient {
    async fn info_full(&self, addr: &str) -> Result<HashMap<String, String>, RemoteError> {
        let mut conn = self.connect(addr).await?;
        let mut info = conn.info().await?;

        let host = info.get("master_host").cloned().unwrap_or_default();
        let port = info.get("master_port").cloned().unwrap_or_default();
        if !host.is_empty() || !port.is_empty() {
            info.insert("master_addr".to_string(), format!("{}:{}", host, port));
        }

        let reply = conn.call("CONFIG", &["GET", "maxmemory"]).await?;
        let maxmemory = reply
            .as_pairs()
            .and_then(|pairs| pairs.into_iter().next())
            .and_then(|(_, v)| v.parse::<u64>().ok())
            .ok_or_else(|| RemoteError::new(format!("invalid response = {:?}", reply)))?;
        info.insert("maxmemory".to_string(), maxmemory.to_string());

        Ok(info)
    }
}

#[async_trait]
impl SentinelTransport for RespClient {
    async fn sentinel_report(&self, addr: &str) -> Result<RedisReport, RemoteError> {
        let mut conn = self.connect(addr).await?;
        let info = conn.info().await?;

        let mut groups = HashMap::new();
        for master in conn.sentinel_table(&["masters"]).await? {
            let Some(name) = master.get("name").cloned() else {
                continue;
            };
            let Some(gid) = self.master_gid(&name) else {
                continue;
            };
            let slaves = conn.sentinel_table(&["slaves", name.as_str()]).await?;
            groups.insert(gid.to_string(), SentinelGroup { master, slaves });
        }

        Ok(RedisReport {
            info,
            sentinel: Some(groups),
        })
    }
}
