//! Cache Module
//!
//! Provides the on-demand cache and the concurrent collaborators it is built from.

mod entry;
mod inflight;
mod on_demand;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use inflight::{Barrier, Flight, InflightTable, LeaderGuard};
pub use on_demand::OnDemandCache;
pub use store::EntryStore;
