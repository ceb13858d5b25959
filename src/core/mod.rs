pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{FollowerAddr, Key, ReplicationCommand, ReplicationResponse, Value, Version};
