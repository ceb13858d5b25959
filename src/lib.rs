// ============================================================================
// leaderkv
// ============================================================================

extern crate self as leaderkv;

pub mod config;
pub mod core;
pub mod follower;
pub mod leader;
pub mod replication;
pub mod store;
pub mod version;
pub mod web;

pub use config::{NodeRole, RuntimeConfig, StartupConfig, StartupOverrides};
pub use core::{CoreError, FollowerAddr, Key, ReplicationCommand, ReplicationResponse, Result, Value, Version};
pub use follower::FollowerApply;
pub use leader::{LeaderWriter, WriteResult};
pub use replication::{HttpReplicationClient, ReplicationClient};
pub use store::{Store, VersioningPolicy};
pub use version::{CounterVersionSource, TimestampVersionSource, VersionSource};
pub use web::{AppState, build_router};
