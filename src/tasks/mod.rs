//! Background Tasks Module
//!
//! Contains background tasks that run alongside a cache.
//!
//! # Tasks
//! - Expiry sweeper: removes expired entries at a fixed interval

mod sweeper;

pub use sweeper::spawn_sweeper;
