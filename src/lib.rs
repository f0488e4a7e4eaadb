//! Client-side catalog cache kept consistent with a remote HTTP service.
//!
//! - [`sync::SyncRepository`] serves cached items, refreshes them from the service and
//!   reloads after every create or update
//! - [`overlay::OverlayStore`] keeps device-only attributes next to the synced items
//! - [`catalog`] holds the item types and the HTTP client

pub mod app;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod overlay;
pub mod sync;
