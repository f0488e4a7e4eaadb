//! Catalog domain: items, their wire format and the HTTP remote source.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod types;

pub use client::CatalogClient;
pub use types::{Item, ItemBadge, ItemStatus, ResourcePin};
