//! Remote source abstraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::Entity;

/// Raw failure reported by a remote source, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  /// No response reached us (connect, timeout, TLS, ...)
  #[error("transport failure: {0}")]
  Transport(String),

  /// A response arrived but reported failure
  #[error("remote responded with status {code}: {body}")]
  Status { code: u16, body: String },

  /// A success response whose payload could not be used
  #[error("malformed response: {0}")]
  Malformed(String),
}

/// The remote service that owns the authoritative copy of `E`.
#[async_trait]
pub trait RemoteSource<E: Entity>: Send + Sync + 'static {
  /// Full listing of all entities.
  async fn list_all(&self) -> Result<Vec<E>, RemoteError>;

  /// Create an entity from a draft. Returns the entity as stored remotely.
  async fn create(&self, draft: &E) -> Result<E, RemoteError>;

  /// Replace an existing entity. Returns the entity as stored remotely.
  async fn update(&self, entity: &E) -> Result<E, RemoteError>;

  /// Change only the status of an entity.
  async fn set_status(&self, key: &E::Key, status: &E::Status) -> Result<(), RemoteError>;
}
