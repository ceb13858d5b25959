use thiserror::Error;

/// Taxonomy of failures the core can produce.
///
/// Per-follower replication failures are deliberately *not* represented here —
/// they never propagate as an `Err`, they become entries in
/// [`crate::leader::WriteResult::responses`] instead.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
