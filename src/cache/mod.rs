//! # Order Cache
//!
//! In-process, bounded, TTL-expiring cache of order aggregates that sits in
//! front of the repository on the read path and is populated by ingestion.
//! One instance per process, shared through `Arc`; the lock discipline stays
//! inside [`TtlCache`].

pub mod janitor;
pub mod ttl_cache;

pub use janitor::CacheJanitor;
pub use ttl_cache::{OrderCache, TtlCache};
