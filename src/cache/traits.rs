//! Core traits and types for the caching system.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait for entities that can be held in a [`CacheTable`](super::CacheTable) and synced
/// with a remote source.
///
/// Implementors provide a stable identity key, an ordering name for listings and a
/// local validity check that runs before anything is sent over the network.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
  /// Stable identity (e.g., item id)
  type Key: Ord + Hash + Clone + Debug + Display + Send + Sync + 'static;

  /// Lifecycle status that can be changed without a full update (e.g., active/inactive)
  type Status: Clone + Debug + Send + Sync + 'static;

  /// Unique identifier for this entity.
  fn key(&self) -> Self::Key;

  /// Name used to order listings.
  fn sort_name(&self) -> &str;

  /// Check local preconditions before the entity is sent to the remote source.
  ///
  /// Returns a human-readable reason when the entity must not be sent.
  fn validate(&self) -> Result<(), String>;

  /// Copy of this entity with its status replaced.
  fn with_status(&self, status: &Self::Status) -> Self;

  /// Entity type name used in logs and storage (e.g., "item").
  fn entity_type() -> &'static str;
}

/// Listing order: by name ascending, ties broken by key ascending.
pub fn listing_order<E: Entity>(a: &E, b: &E) -> Ordering {
  a.sort_name()
    .cmp(b.sort_name())
    .then_with(|| a.key().cmp(&b.key()))
}

/// Sort entities into deterministic listing order.
pub fn sort_for_listing<E: Entity>(mut entities: Vec<E>) -> Vec<E> {
  entities.sort_by(listing_order);
  entities
}

/// Whether a table's contents can be trusted without asking the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
  /// Nothing has been loaded yet
  #[default]
  Empty,
  /// Contents were fully replaced by the last successful listing
  Fresh,
  /// Contents were changed locally since the last listing, or a reload failed
  Stale,
}

impl Freshness {
  pub fn is_fresh(self) -> bool {
    matches!(self, Freshness::Fresh)
  }
}
