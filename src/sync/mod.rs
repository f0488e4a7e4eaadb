//! Keeping cached entities consistent with a remote source.
//!
//! Remote failures never cross this module as raw errors: they are classified into an
//! [`ErrorKind`] and returned as an [`Outcome`].

mod outcome;
mod remote;
mod repository;

pub use outcome::{classify, ErrorKind, Failure, Outcome};
pub use remote::{RemoteError, RemoteSource};
pub use repository::SyncRepository;
