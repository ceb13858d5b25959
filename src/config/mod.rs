//! Startup configuration and the runtime-mutable reconfiguration surface.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{CoreError, FollowerAddr, Result};

/// Process-wide role, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Leader,
    Follower,
}

impl std::str::FromStr for NodeRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Leader" => Ok(NodeRole::Leader),
            "Follower" => Ok(NodeRole::Follower),
            other => Err(CoreError::InvalidConfiguration(format!(
                "NODE_ROLE must be 'Leader' or 'Follower', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "Leader"),
            NodeRole::Follower => write!(f, "Follower"),
        }
    }
}

/// Everything decided once at process startup and never changed again.
///
/// Parsed from environment variables with an optional CLI override for each
/// field: the CLI flag wins over the env var, the env var wins over the
/// documented default.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub role: NodeRole,
    pub bind_addr: String,
    pub followers: Vec<FollowerAddr>,
    pub write_quorum: usize,
    pub follower_timeout_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub use_versioning: bool,
}

/// CLI-supplied overrides for the environment-derived [`StartupConfig`].
/// Each `Some` field wins over the matching environment variable; `None`
/// leaves the environment (or its documented default) in effect. Threading
/// these through directly avoids mutating process-wide environment state at
/// startup.
#[derive(Debug, Clone, Default)]
pub struct StartupOverrides {
    pub role: Option<NodeRole>,
    pub bind_addr: Option<String>,
    pub followers: Option<String>,
    pub write_quorum: Option<usize>,
    pub follower_timeout_ms: Option<u64>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub use_versioning: Option<bool>,
}

impl StartupConfig {
    /// Reads every field from its environment variable, falling back to the
    /// documented default. Equivalent to `StartupConfig::load` with no
    /// overrides.
    pub fn from_env() -> Result<Self> {
        Self::load(StartupOverrides::default())
    }

    /// Reads every field from its environment variable, falling back to the
    /// documented default, except where `overrides` supplies a CLI-derived
    /// value — a `Some` field there wins over the environment. Validates
    /// cross-field constraints before returning.
    pub fn load(overrides: StartupOverrides) -> Result<Self> {
        let role = match overrides.role {
            Some(role) => role,
            None => env_string("NODE_ROLE", "Leader").parse::<NodeRole>()?,
        };
        let bind_addr = overrides
            .bind_addr
            .unwrap_or_else(|| env_string("BIND_ADDR", "127.0.0.1:8080"));
        let followers = match overrides.followers {
            Some(raw) => parse_followers(&raw)?,
            None => parse_followers(&env_string("FOLLOWERS", ""))?,
        };
        let write_quorum = match overrides.write_quorum {
            Some(q) => q,
            None => env_parsed("WRITE_QUORUM", 1)?,
        };
        let follower_timeout_ms = match overrides.follower_timeout_ms {
            Some(ms) => ms,
            None => env_parsed("FOLLOWER_TIMEOUT_MS", 2000)?,
        };
        let min_delay_ms = match overrides.min_delay_ms {
            Some(ms) => ms,
            None => env_parsed("MIN_DELAY_MS", 0)?,
        };
        let max_delay_ms = match overrides.max_delay_ms {
            Some(ms) => ms,
            None => env_parsed("MAX_DELAY_MS", 1000)?,
        };
        let use_versioning = match overrides.use_versioning {
            Some(v) => v,
            None => env_bool("USE_VERSIONING", true)?,
        };

        let config = Self {
            role,
            bind_addr,
            followers,
            write_quorum,
            follower_timeout_ms,
            min_delay_ms,
            max_delay_ms,
            use_versioning,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation run once at boot. A failure here is a
    /// non-zero exit, never a runtime error.
    pub fn validate(&self) -> Result<()> {
        if self.write_quorum > self.followers.len() {
            return Err(CoreError::InvalidConfiguration(format!(
                "WRITE_QUORUM ({}) exceeds follower count ({})",
                self.write_quorum,
                self.followers.len()
            )));
        }
        if self.min_delay_ms > 0 && self.max_delay_ms == 0 {
            // MaxDelayMs == 0 means "skip delay"; a nonzero floor makes no sense then.
            return Err(CoreError::InvalidConfiguration(
                "MIN_DELAY_MS must be 0 when MAX_DELAY_MS is 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name).ok() {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::InvalidConfiguration(format!("{name} is not a valid value"))),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name).ok().as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(_) => Err(CoreError::InvalidConfiguration(format!(
            "{name} must be a boolean"
        ))),
    }
}

fn parse_followers(raw: &str) -> Result<Vec<FollowerAddr>> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|addr| {
            if !addr.starts_with("http://") && !addr.starts_with("https://") {
                return Err(CoreError::InvalidConfiguration(format!(
                    "follower address '{addr}' must be an http(s) base URL"
                )));
            }
            Ok(FollowerAddr::from(addr))
        })
        .collect()
}

/// The subset of configuration that may be changed at runtime via
/// `POST /config`. Each field is its own atomic cell, sampled
/// independently — there is no cross-field snapshot.
pub struct RuntimeConfig {
    write_quorum: AtomicU64,
    min_delay_ms: AtomicU64,
    max_delay_ms: AtomicU64,
    follower_count: usize,
}

impl RuntimeConfig {
    pub fn new(startup: &StartupConfig) -> Self {
        Self {
            write_quorum: AtomicU64::new(startup.write_quorum as u64),
            min_delay_ms: AtomicU64::new(startup.min_delay_ms),
            max_delay_ms: AtomicU64::new(startup.max_delay_ms),
            follower_count: startup.followers.len(),
        }
    }

    pub fn write_quorum(&self) -> usize {
        self.write_quorum.load(Ordering::SeqCst) as usize
    }

    pub fn min_delay_ms(&self) -> u64 {
        self.min_delay_ms.load(Ordering::SeqCst)
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms.load(Ordering::SeqCst)
    }

    pub fn follower_count(&self) -> usize {
        self.follower_count
    }

    /// Validates and applies a `POST /config` update. Unset fields are
    /// left untouched.
    pub fn apply_update(
        &self,
        write_quorum: Option<usize>,
        min_delay_ms: Option<u64>,
        max_delay_ms: Option<u64>,
    ) -> Result<()> {
        if let Some(q) = write_quorum {
            if q > self.follower_count {
                return Err(CoreError::InvalidConfiguration(format!(
                    "writeQuorum ({q}) exceeds follower count ({})",
                    self.follower_count
                )));
            }
        }
        // Validate before mutating anything, so a rejected update never partially applies.
        self.write_quorum
            .store(write_quorum.unwrap_or(self.write_quorum()) as u64, Ordering::SeqCst);
        if let Some(min) = min_delay_ms {
            self.min_delay_ms.store(min, Ordering::SeqCst);
        }
        if let Some(max) = max_delay_ms {
            self.max_delay_ms.store(max, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn startup(write_quorum: usize, followers: usize) -> StartupConfig {
        StartupConfig {
            role: NodeRole::Leader,
            bind_addr: "127.0.0.1:0".to_string(),
            followers: (0..followers)
                .map(|i| FollowerAddr::from(format!("http://127.0.0.1:900{i}")))
                .collect(),
            write_quorum,
            follower_timeout_ms: 2000,
            min_delay_ms: 0,
            max_delay_ms: 1000,
            use_versioning: true,
        }
    }

    #[test]
    fn quorum_exceeding_follower_count_fails_validation() {
        let config = startup(3, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn quorum_within_bounds_validates() {
        let config = startup(2, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn runtime_config_rejects_quorum_update_above_follower_count() {
        let runtime = RuntimeConfig::new(&startup(1, 2));
        assert!(runtime.apply_update(Some(5), None, None).is_err());
        assert_eq!(runtime.write_quorum(), 1, "rejected update must not mutate state");
    }

    #[test]
    fn runtime_config_applies_partial_updates() {
        let runtime = RuntimeConfig::new(&startup(1, 2));
        runtime.apply_update(Some(2), None, Some(500)).unwrap();
        assert_eq!(runtime.write_quorum(), 2);
        assert_eq!(runtime.max_delay_ms(), 500);
        assert_eq!(runtime.min_delay_ms(), 0);
    }

    #[test]
    fn parse_followers_rejects_non_http_address() {
        assert!(parse_followers("not-a-url").is_err());
    }

    #[test]
    fn parse_followers_splits_on_semicolon() {
        let followers = parse_followers("http://a:1;http://b:2").unwrap();
        assert_eq!(followers.len(), 2);
    }
}
