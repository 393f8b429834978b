//! Error types for the on-demand cache
//!
//! Provides unified error handling using thiserror. A cache miss is never an
//! error; only construction can fail.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the on-demand cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background sweeper was requested outside a tokio runtime
    #[error("Background sweeper requires a running tokio runtime")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the on-demand cache.
pub type Result<T> = std::result::Result<T, CacheError>;
