use serde::{Deserialize, Serialize};

/// Opaque, byte-transparent key. Never parsed or interpreted.
pub type Key = String;

/// Opaque, byte-transparent value. May be empty.
pub type Value = String;

/// 64-bit monotonic (under the counter policy) write version.
pub type Version = u64;

/// One logical key-level change, carried from leader to follower. Field
/// names are capitalized to match the replication wire format exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCommand {
    #[serde(rename = "Key")]
    pub key: Key,
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Version")]
    pub version: Version,
}

impl ReplicationCommand {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>, version: Version) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version,
        }
    }
}

/// Outcome of one `ReplicationClient::send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationResponse {
    Success,
    Timeout,
    Failure(String),
}

impl ReplicationResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ReplicationResponse::Success)
    }
}

impl std::fmt::Display for ReplicationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationResponse::Success => write!(f, "success"),
            ReplicationResponse::Timeout => write!(f, "timeout"),
            ReplicationResponse::Failure(msg) => write!(f, "failure: {msg}"),
        }
    }
}

/// Identifies one follower by its HTTP base address, e.g. `http://127.0.0.1:8081`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowerAddr(pub String);

impl std::fmt::Display for FollowerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FollowerAddr {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FollowerAddr {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
