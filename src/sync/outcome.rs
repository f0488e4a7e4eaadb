//! Outcome type and failure classification at the repository boundary.

use std::fmt;
use thiserror::Error;

use super::remote::RemoteError;

/// Closed set of failure categories callers can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// No response reached the service
  Transport,
  /// The addressed resource does not exist
  NotFound,
  /// The service rejected the request with this status code
  Rejected(u16),
  /// A success response with an unusable payload, or a draft that failed local validation
  Malformed,
  /// A shared in-flight listing ended without producing a result
  Coalesced,
  /// The caller broke a local invariant; never sent anywhere
  LocalPrecondition,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::Transport => write!(f, "transport"),
      ErrorKind::NotFound => write!(f, "not found"),
      ErrorKind::Rejected(code) => write!(f, "rejected ({})", code),
      ErrorKind::Malformed => write!(f, "malformed"),
      ErrorKind::Coalesced => write!(f, "coalesced"),
      ErrorKind::LocalPrecondition => write!(f, "local precondition"),
    }
  }
}

/// A classified failure with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
  pub kind: ErrorKind,
  pub message: String,
}

impl Failure {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn local_precondition(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::LocalPrecondition, message)
  }

  /// Classify a raw remote failure, keeping its description as the detail.
  pub fn from_remote(error: &RemoteError) -> Self {
    Self::new(classify(error), error.to_string())
  }
}

impl From<RemoteError> for Failure {
  fn from(error: RemoteError) -> Self {
    Self::from_remote(&error)
  }
}

/// Result of a repository or overlay operation.
pub type Outcome<T> = Result<T, Failure>;

/// Map a raw remote failure onto an [`ErrorKind`].
pub fn classify(error: &RemoteError) -> ErrorKind {
  match error {
    RemoteError::Transport(_) => ErrorKind::Transport,
    RemoteError::Status { code: 404, .. } => ErrorKind::NotFound,
    // A success status surfaced as an error means the body was unusable
    RemoteError::Status { code, .. } if (200..300).contains(code) => ErrorKind::Malformed,
    RemoteError::Status { code, .. } => ErrorKind::Rejected(*code),
    RemoteError::Malformed(_) => ErrorKind::Malformed,
  }
}
