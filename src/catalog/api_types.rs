//! Serde types matching the catalog service's JSON payloads.
//!
//! These are separate from domain types so that missing or null fields can be
//! detected and reported as malformed responses instead of panicking or defaulting.

use serde::{Deserialize, Serialize};

use super::types::{Item, ItemStatus};
use crate::sync::RemoteError;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiItem {
  pub id: Option<u64>,
  pub name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default, alias = "priceCents")]
  pub price_cents: u64,
  #[serde(default)]
  pub status: Option<ItemStatus>,
}

impl ApiItem {
  /// Convert to a domain item, failing when a required field is absent.
  pub fn into_item(self) -> Result<Item, String> {
    let id = self.id.ok_or("item without `id`")?;
    let name = self
      .name
      .filter(|n| !n.trim().is_empty())
      .ok_or_else(|| format!("item {} without `name`", id))?;

    Ok(Item {
      id,
      name,
      description: self.description,
      category: self.category,
      price_cents: self.price_cents,
      status: self.status.unwrap_or(ItemStatus::Active),
    })
  }
}

/// Listings come either as a bare array or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiItemList {
  Bare(Vec<ApiItem>),
  Wrapped { items: Vec<ApiItem> },
}

impl ApiItemList {
  fn into_items(self) -> Vec<ApiItem> {
    match self {
      ApiItemList::Bare(items) | ApiItemList::Wrapped { items } => items,
    }
  }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiItemBody<'a> {
  pub name: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<&'a str>,
  pub price_cents: u64,
  pub status: ItemStatus,
}

impl<'a> From<&'a Item> for ApiItemBody<'a> {
  fn from(item: &'a Item) -> Self {
    Self {
      name: item.name.trim(),
      description: item.description.as_deref(),
      category: item.category.as_deref(),
      price_cents: item.price_cents,
      status: item.status,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiStatusBody {
  pub status: ItemStatus,
}

// ============================================================================
// Decoding
// ============================================================================

fn non_empty(body: &[u8]) -> Result<&[u8], RemoteError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Err(RemoteError::Malformed("empty response body".to_string()));
  }
  Ok(body)
}

/// Decode a listing response.
pub fn decode_items(body: &[u8]) -> Result<Vec<Item>, RemoteError> {
  let list: ApiItemList = serde_json::from_slice(non_empty(body)?)
    .map_err(|e| RemoteError::Malformed(format!("invalid item list: {}", e)))?;

  list
    .into_items()
    .into_iter()
    .map(|item| item.into_item().map_err(RemoteError::Malformed))
    .collect()
}

/// Decode a single-item response.
pub fn decode_item(body: &[u8]) -> Result<Item, RemoteError> {
  let item: ApiItem = serde_json::from_slice(non_empty(body)?)
    .map_err(|e| RemoteError::Malformed(format!("invalid item: {}", e)))?;

  item.into_item().map_err(RemoteError::Malformed)
}
