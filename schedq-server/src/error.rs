//! Error types for the schedq server services.

use thiserror::Error;

/// Result type for the schedq server services.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while binding or running a transport service.
#[derive(Error, Debug)]
pub enum Error {
  /// Address could not be bound or the listener failed.
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  /// Error bubbled up from the scheduler core.
  #[error(transparent)]
  Core(#[from] schedq::error::Error),
}
