use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::catalog::api_types::{decode_item, decode_items, ApiItemBody, ApiStatusBody};
use crate::catalog::types::{Item, ItemStatus};
use crate::config::RemoteConfig;
use crate::sync::{RemoteError, RemoteSource};

/// Catalog service API client
#[derive(Clone)]
pub struct CatalogClient {
  client: Client,
  items_url: Url,
}

impl CatalogClient {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    let items_url = items_url(&config.base_url, &config.items_path)?;

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("catalog-sync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, items_url })
  }

  fn item_url(&self, id: u64, suffix: Option<&str>) -> Url {
    let mut url = self.items_url.clone();
    // items_url was checked to be a base URL in `items_url`
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.push(&id.to_string());
      if let Some(suffix) = suffix {
        segments.push(suffix);
      }
    }
    url
  }

  /// Send a request and return the body of a successful response.
  async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, RemoteError> {
    let response = request
      .header(ACCEPT, HeaderValue::from_static("application/json"))
      .send()
      .await
      .map_err(|e| RemoteError::Transport(e.to_string()))?;

    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| RemoteError::Transport(format!("failed to read response body: {}", e)))?;

    debug!(status = status.as_u16(), bytes = body.len(), "catalog response");

    if !status.is_success() {
      return Err(RemoteError::Status {
        code: status.as_u16(),
        body: String::from_utf8_lossy(&body).into_owned(),
      });
    }

    Ok(body.to_vec())
  }
}

/// Attach a JSON body to a request.
fn with_json<T: Serialize>(request: RequestBuilder, body: &T) -> Result<RequestBuilder, RemoteError> {
  let bytes = serde_json::to_vec(body)
    .map_err(|e| RemoteError::Transport(format!("failed to encode request: {}", e)))?;
  Ok(
    request
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .body(bytes),
  )
}

/// Build the collection URL from the configured base URL and path.
pub fn items_url(base_url: &str, items_path: &str) -> Result<Url> {
  let mut url =
    Url::parse(base_url).map_err(|e| eyre!("Invalid base URL '{}': {}", base_url, e))?;

  url
    .path_segments_mut()
    .map_err(|_| eyre!("Base URL '{}' cannot hold a path", base_url))?
    .pop_if_empty()
    .extend(items_path.split('/').filter(|s| !s.is_empty()));

  Ok(url)
}

#[async_trait]
impl RemoteSource<Item> for CatalogClient {
  async fn list_all(&self) -> Result<Vec<Item>, RemoteError> {
    let body = self.send(self.client.get(self.items_url.clone())).await?;
    decode_items(&body)
  }

  async fn create(&self, draft: &Item) -> Result<Item, RemoteError> {
    let request = with_json(
      self.client.post(self.items_url.clone()),
      &ApiItemBody::from(draft),
    )?;
    decode_item(&self.send(request).await?)
  }

  async fn update(&self, item: &Item) -> Result<Item, RemoteError> {
    let request = with_json(
      self.client.put(self.item_url(item.id, None)),
      &ApiItemBody::from(item),
    )?;
    decode_item(&self.send(request).await?)
  }

  async fn set_status(&self, id: &u64, status: &ItemStatus) -> Result<(), RemoteError> {
    let request = with_json(
      self.client.put(self.item_url(*id, Some("status"))),
      &ApiStatusBody { status: *status },
    )?;
    // Only the status code matters here; some services answer with an empty body
    self.send(request).await?;
    Ok(())
  }
}
