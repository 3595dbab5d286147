/// Core topology model shared by the store, the orchestrators and the API
pub mod fanin;
pub mod store;

use serde::{Deserialize, Serialize};

/// Largest group id a cluster may use
pub const MAX_GROUP_ID: i32 = 9999;

/// Progress marker of an externally driven workflow step.
///
/// Only stored and exposed; the labels carry no meaning here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub index: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// A replica set of data servers. The first server is the primary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i32,
    #[serde(default)]
    pub servers: Vec<GroupServer>,
    #[serde(default)]
    pub promoting: ActionState,
    #[serde(default)]
    pub out_of_sync: bool,
}

/// One data server inside a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupServer {
    #[serde(rename = "server")]
    pub addr: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub action: ActionState,
    #[serde(default)]
    pub replica_group: bool,
}

/// A registered proxy instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i32,
    pub token: String,
    #[serde(default)]
    pub start_time: String,
    pub admin_addr: String,
    #[serde(default)]
    pub proto_type: String,
    #[serde(default)]
    pub proxy_addr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jodis_path: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub pwd: String,
    #[serde(default)]
    pub sys: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub datacenter: String,
}

/// Sentinel nodes watching the cluster's groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentinel {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,
    #[serde(default)]
    pub out_of_sync: bool,
}

impl Group {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Append a server; the first one added is the primary
    pub fn with_server(mut self, addr: &str) -> Self {
        self.servers.push(GroupServer::new(addr));
        self
    }

    pub fn primary(&self) -> Option<&GroupServer> {
        self.servers.first()
    }

    pub fn encode(&self) -> String {
        json_encode(self)
    }
}

impl GroupServer {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            ..Default::default()
        }
    }
}

impl Proxy {
    pub fn new(token: &str, admin_addr: &str) -> Self {
        Self {
            token: token.to_string(),
            admin_addr: admin_addr.to_string(),
            ..Default::default()
        }
    }

    pub fn encode(&self) -> String {
        json_encode(self)
    }
}

impl Sentinel {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            out_of_sync: false,
        }
    }

    pub fn encode(&self) -> String {
        json_encode(self)
    }
}

fn json_encode<T: Serialize>(value: &T) -> String {
    // Serializing these plain structs cannot fail.
    serde_json::to_string_pretty(value).unwrap_or_default()
}
