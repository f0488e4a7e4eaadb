use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{PersistentStore, SqliteStore, Subscription};
use crate::catalog::{CatalogClient, Item, ItemStatus, ResourcePin};
use crate::config::Config;
use crate::overlay::{OverlayStats, OverlayStore, ResourceRef};
use crate::sync::{RemoteSource, SyncRepository};

/// Field changes for an existing item
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
  pub name: Option<String>,
  pub price_cents: Option<u64>,
  pub description: Option<String>,
  pub category: Option<String>,
}

impl ItemChanges {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.price_cents.is_none()
      && self.description.is_none()
      && self.category.is_none()
  }

  fn apply(&self, item: &Item) -> Item {
    let mut changed = item.clone();
    if let Some(name) = &self.name {
      changed.name = name.clone();
    }
    if let Some(price) = self.price_cents {
      changed.price_cents = price;
    }
    if let Some(description) = &self.description {
      changed.description = Some(description.clone());
    }
    if let Some(category) = &self.category {
      changed.category = Some(category.clone());
    }
    changed
  }
}

/// An item together with its locally chosen resource
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
  pub item: Item,
  pub resource: Option<ResourceRef>,
}

/// Application state: the synced catalog, its overlay and the local store.
pub struct App<R, S> {
  items: SyncRepository<Item, R>,
  overlay: OverlayStore<Item>,
  store: S,
}

impl App<CatalogClient, SqliteStore> {
  pub fn new(config: &Config) -> Result<Self> {
    let client = CatalogClient::new(&config.remote)?;
    let store = SqliteStore::open(config.store.path.as_deref())?;
    Ok(Self::with_parts(Arc::new(client), store))
  }
}

impl<R: RemoteSource<Item>, S: PersistentStore> App<R, S> {
  pub fn with_parts(remote: Arc<R>, store: S) -> Self {
    Self {
      items: SyncRepository::new(remote),
      overlay: OverlayStore::new(),
      store,
    }
  }

  /// Load the catalog and bring the overlay in line with it.
  pub async fn load(&self, refresh: bool) -> Result<Vec<ItemRow>> {
    let items = self.items.fetch_all(refresh).await?;
    self.sync_overlay(&items, true)?;
    Ok(self.rows(items))
  }

  /// Cached rows, without contacting the service.
  pub fn cached_rows(&self) -> Vec<ItemRow> {
    self.rows(self.items.cached())
  }

  pub async fn create(&self, draft: Item) -> Result<Item> {
    let created = self.items.create(draft).await?;
    info!(id = created.id, name = %created.name, "item created");
    self.sync_after_mutation()?;
    Ok(created)
  }

  pub async fn update(&self, id: u64, changes: &ItemChanges) -> Result<Item> {
    if changes.is_empty() {
      return Err(eyre!("Nothing to update for item {}", id));
    }
    let current = self.find(id).await?;
    let updated = self.items.update(changes.apply(&current)).await?;
    info!(id, "item updated");
    self.sync_after_mutation()?;
    Ok(updated)
  }

  pub async fn set_status(&self, id: u64, status: ItemStatus) -> Result<()> {
    self.items.set_status(id, status).await?;
    info!(id, %status, "item status changed");
    if let Some(item) = self.items.get(&id) {
      if self.overlay.get(&id).is_some() {
        self.overlay.reconcile(&item)?;
      }
    }
    Ok(())
  }

  /// Attach a local resource to an item and remember it on this device.
  pub async fn pin(&self, id: u64, resource: ResourceRef) -> Result<()> {
    self.load(false).await?;
    self.overlay.set_local_resource(&id, Some(resource.clone()))?;
    self.store.put(&ResourcePin {
      item_id: id,
      resource,
    })?;
    Ok(())
  }

  pub async fn unpin(&self, id: u64) -> Result<()> {
    self.load(false).await?;
    self.overlay.set_local_resource(&id, None)?;
    self.store.delete::<ResourcePin>(&id.to_string())?;
    Ok(())
  }

  pub fn overlay_stats(&self) -> OverlayStats {
    self.overlay.stats()
  }

  pub fn subscribe(&self) -> Subscription<Item> {
    self.items.subscribe()
  }

  pub fn refreshed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
    self.items.refreshed_at()
  }

  async fn find(&self, id: u64) -> Result<Item> {
    if let Some(item) = self.items.get(&id) {
      return Ok(item);
    }
    self
      .items
      .fetch_all(false)
      .await?
      .into_iter()
      .find(|item| item.id == id)
      .ok_or_else(|| eyre!("Item {} not found", id))
  }

  /// Sync the overlay with the cached items once a mutation went through.
  ///
  /// Only a fresh table is a complete listing. After a failed reload the cache may
  /// be stale or empty, which says nothing about deleted items.
  fn sync_after_mutation(&self) -> Result<()> {
    let complete = self.items.freshness().is_fresh();
    if !complete {
      debug!("reload did not complete, keeping overlay entries and pins");
    }
    self.sync_overlay(&self.items.cached(), complete)
  }

  /// Create and reconcile overlay entries for `items`, then restore saved pins.
  ///
  /// With `complete`, `items` is the whole catalog: entries and pins of any
  /// other item are removed.
  fn sync_overlay(&self, items: &[Item], complete: bool) -> Result<()> {
    let created = self.overlay.initialize(items);
    for item in items {
      self.overlay.reconcile(item)?;
    }
    let removed = if complete {
      self.overlay.retain_owners(items)
    } else {
      0
    };
    debug!(created, removed, "overlay synced");

    for pin in self.store.list::<ResourcePin>()? {
      if self.overlay.get(&pin.item_id).is_some() {
        self
          .overlay
          .set_local_resource(&pin.item_id, Some(pin.resource))?;
      } else if complete {
        debug!(item_id = pin.item_id, "dropping pin for removed item");
        self
          .store
          .delete::<ResourcePin>(&pin.item_id.to_string())?;
      }
    }
    Ok(())
  }

  fn rows(&self, items: Vec<Item>) -> Vec<ItemRow> {
    items
      .into_iter()
      .map(|item| {
        let resource = self
          .overlay
          .get(&item.id)
          .and_then(|entry| entry.local_resource);
        ItemRow { item, resource }
      })
      .collect()
  }
}
