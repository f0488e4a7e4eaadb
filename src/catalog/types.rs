use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::overlay::ResourceRef;

/// Whether an item is offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
  Active,
  Inactive,
}

impl fmt::Display for ItemStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(match self {
      ItemStatus::Active => "active",
      ItemStatus::Inactive => "inactive",
    })
  }
}

impl FromStr for ItemStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "active" => Ok(ItemStatus::Active),
      "inactive" => Ok(ItemStatus::Inactive),
      other => Err(format!("unknown item status '{}'", other)),
    }
  }
}

/// Catalog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
  /// Assigned by the service; 0 for drafts
  pub id: u64,
  pub name: String,
  pub description: Option<String>,
  pub category: Option<String>,
  pub price_cents: u64,
  pub status: ItemStatus,
}

impl Item {
  /// A new item that has not been sent to the service yet.
  pub fn draft(name: impl Into<String>, price_cents: u64) -> Self {
    Self {
      id: 0,
      name: name.into(),
      description: None,
      category: None,
      price_cents,
      status: ItemStatus::Active,
    }
  }

  pub fn is_active(&self) -> bool {
    self.status == ItemStatus::Active
  }
}

/// Display fields derived from an item, kept in the overlay store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBadge {
  pub title: String,
  pub initials: String,
  pub price_label: String,
  pub active: bool,
}

/// A local resource chosen for an item, persisted on this device only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePin {
  pub item_id: u64,
  pub resource: ResourceRef,
}

/// Format cents as a decimal price, e.g. 1250 -> "12.50"
pub fn price_label(price_cents: u64) -> String {
  format!("{}.{:02}", price_cents / 100, price_cents % 100)
}

/// Parse a decimal price ("12.5", "12.50", "12") into cents.
pub fn parse_price(input: &str) -> Result<u64, String> {
  let input = input.trim();
  let (units, fraction) = match input.split_once('.') {
    Some((units, fraction)) => (units, fraction),
    None => (input, ""),
  };

  if units.is_empty() && fraction.is_empty() {
    return Err("price is empty".to_string());
  }
  let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
  if fraction.len() > 2 || !digits(units) || !digits(fraction) {
    return Err(format!("invalid price '{}'", input));
  }

  let units: u64 = if units.is_empty() {
    0
  } else {
    units
      .parse()
      .map_err(|_| format!("invalid price '{}'", input))?
  };
  let cents: u64 = format!("{:0<2}", fraction)
    .parse()
    .map_err(|_| format!("invalid price '{}'", input))?;

  units
    .checked_mul(100)
    .and_then(|u| u.checked_add(cents))
    .ok_or_else(|| format!("price '{}' is too large", input))
}
