//! On-Demand Cache - A memoizing in-process cache with single-flight population
//!
//! Computes values through a caller-supplied source on a miss, runs at most one
//! source call per key at a time, and expires entries after a configurable TTL.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheEntry, OnDemandCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
