//! Locally owned attributes layered over remotely synced entities.
//!
//! An overlay entry shares its key with an owner entity. Its derived fields are
//! recomputed from the owner, while its local resource is only ever changed through
//! [`OverlayStore::set_local_resource`]. Nothing here is sent to the remote source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Display};

use crate::cache::{CacheTable, Subscription};
use crate::sync::{Failure, Outcome};

/// An owner entity as seen by the overlay store.
pub trait OwnerSummary {
  type Key: Ord + Clone + Debug + Display + Send + Sync + 'static;
  type Derived: Clone + Debug + PartialEq + Send + Sync + 'static;

  fn owner_key(&self) -> Self::Key;

  /// Compute the overlay's derived fields from this owner.
  fn derive(&self) -> Self::Derived;
}

/// Reference to a locally chosen resource (e.g., an image path or URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
  pub fn new(location: impl Into<String>) -> Self {
    Self(location.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Display for ResourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry<K, D> {
  pub key: K,
  pub derived: D,
  pub local_resource: Option<ResourceRef>,
}

/// Read-only projection of the overlay contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStats {
  pub total: usize,
  pub with_resource: usize,
  pub percent_with_resource: f64,
}

type EntryOf<O> = OverlayEntry<<O as OwnerSummary>::Key, <O as OwnerSummary>::Derived>;

/// Keyed store of overlay entries, one per owner.
pub struct OverlayStore<O: OwnerSummary> {
  table: CacheTable<O::Key, EntryOf<O>>,
}

impl<O: OwnerSummary> OverlayStore<O> {
  pub fn new() -> Self {
    Self {
      table: CacheTable::new(),
    }
  }

  /// Create a default entry for every owner that has none yet.
  ///
  /// Existing entries keep both their local resource and their derived fields.
  /// Returns how many entries were created.
  pub fn initialize(&self, owners: &[O]) -> usize {
    owners
      .iter()
      .filter(|owner| {
        let key = owner.owner_key();
        self.table.upsert_with(key.clone(), |current| match current {
          Some(_) => None,
          None => Some(OverlayEntry {
            key,
            derived: owner.derive(),
            local_resource: None,
          }),
        })
      })
      .count()
  }

  /// Recompute the derived fields of `owner`'s entry. The local resource is kept.
  pub fn reconcile(&self, owner: &O) -> Outcome<()> {
    let key = owner.owner_key();
    let derived = owner.derive();
    let mut present = false;

    self.table.upsert_with(key.clone(), |current| {
      let entry = current?;
      present = true;
      (entry.derived != derived).then(|| OverlayEntry {
        derived,
        ..entry.clone()
      })
    });

    if present {
      Ok(())
    } else {
      Err(Failure::local_precondition(format!(
        "no overlay entry for {}; initialize it first",
        key
      )))
    }
  }

  /// Set or clear the local resource of an initialized entry.
  pub fn set_local_resource(&self, key: &O::Key, resource: Option<ResourceRef>) -> Outcome<()> {
    let mut present = false;

    self.table.upsert_with(key.clone(), |current| {
      let entry = current?;
      present = true;
      (entry.local_resource != resource).then(|| OverlayEntry {
        local_resource: resource,
        ..entry.clone()
      })
    });

    if present {
      Ok(())
    } else {
      Err(Failure::local_precondition(format!(
        "no overlay entry for {}; initialize it first",
        key
      )))
    }
  }

  /// Delete the entry of an owner that no longer exists.
  pub fn remove(&self, key: &O::Key) -> Option<EntryOf<O>> {
    self.table.remove(key)
  }

  /// Remove every entry whose owner is not in `owners`. Returns how many were removed.
  pub fn retain_owners(&self, owners: &[O]) -> usize {
    let live: BTreeSet<O::Key> = owners.iter().map(O::owner_key).collect();
    self
      .table
      .snapshot()
      .into_iter()
      .filter(|entry| !live.contains(&entry.key))
      .filter_map(|entry| self.table.remove(&entry.key))
      .count()
  }

  pub fn get(&self, key: &O::Key) -> Option<EntryOf<O>> {
    self.table.get(key)
  }

  /// All entries, in key order.
  pub fn snapshot(&self) -> Vec<EntryOf<O>> {
    self.table.snapshot()
  }

  pub fn stats(&self) -> OverlayStats {
    let entries = self.table.snapshot();
    let total = entries.len();
    let with_resource = entries
      .iter()
      .filter(|e| e.local_resource.is_some())
      .count();
    let percent_with_resource = if total == 0 {
      0.0
    } else {
      with_resource as f64 * 100.0 / total as f64
    };

    OverlayStats {
      total,
      with_resource,
      percent_with_resource,
    }
  }

  pub fn subscribe(&self) -> Subscription<EntryOf<O>> {
    self.table.subscribe()
  }
}

impl<O: OwnerSummary> Default for OverlayStore<O> {
  fn default() -> Self {
    Self::new()
  }
}
