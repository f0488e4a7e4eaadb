//! Generic caching building blocks.
//!
//! This module is domain-agnostic:
//! - `CacheTable` holds keyed entities in memory with a freshness flag and subscribers
//! - `Entity` describes what the sync layer needs from a cached type
//! - `PersistentStore` is a passive durable keyed store for local-only records

mod storage;
mod table;
mod traits;

pub use storage::{PersistentStore, Record, SqliteStore, StoredRecord};
pub use table::{CacheTable, Subscription};
pub use traits::{listing_order, sort_for_listing, Entity, Freshness};
