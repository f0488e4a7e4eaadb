//! Caching implementations for catalog types.

use crate::cache::{Entity, Record};
use crate::overlay::OwnerSummary;

use super::types::{price_label, Item, ItemBadge, ItemStatus, ResourcePin};

// ============================================================================
// Entity implementations
// ============================================================================

impl Entity for Item {
  type Key = u64;
  type Status = ItemStatus;

  fn key(&self) -> u64 {
    self.id
  }

  fn sort_name(&self) -> &str {
    &self.name
  }

  fn validate(&self) -> Result<(), String> {
    if self.name.trim().is_empty() {
      return Err("item name must not be empty".to_string());
    }
    Ok(())
  }

  fn with_status(&self, status: &ItemStatus) -> Self {
    Self {
      status: *status,
      ..self.clone()
    }
  }

  fn entity_type() -> &'static str {
    "item"
  }
}

// ============================================================================
// Overlay owner
// ============================================================================

impl OwnerSummary for Item {
  type Key = u64;
  type Derived = ItemBadge;

  fn owner_key(&self) -> u64 {
    self.id
  }

  fn derive(&self) -> ItemBadge {
    let title = self.name.trim().to_string();
    let initials = title
      .split_whitespace()
      .filter_map(|word| word.chars().next())
      .flat_map(char::to_uppercase)
      .take(2)
      .collect();

    ItemBadge {
      title,
      initials,
      price_label: price_label(self.price_cents),
      active: self.is_active(),
    }
  }
}

// ============================================================================
// Local records
// ============================================================================

impl Record for ResourcePin {
  fn record_key(&self) -> String {
    self.item_id.to_string()
  }

  fn record_type() -> &'static str {
    "resource_pin"
  }
}
