//! Error types for `talon-cache`.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for `talon-cache` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or operating a cache.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// An invalid or contradictory combination of builder options was supplied.
    #[error("[TALON-001] invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// A loader invocation failed. The original cause is preserved.
    #[error("[TALON-002] loader failed for key")]
    LoadFailure(#[source] Arc<LoaderError>),

    /// A loader returned a result that did not satisfy the contract for the
    /// calling operation (e.g. `None` where a value was required).
    #[error("[TALON-003] invalid load result: {0}")]
    InvalidLoadResult(String),
}

impl Error {
    /// Wraps an arbitrary loader error.
    pub fn load_failure<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::LoadFailure(Arc::new(LoaderError(Box::new(cause))))
    }

    /// Builds an [`Error::InvalidConfig`] from a message.
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }
}

/// Opaque wrapper around a user loader's error, preserved as the `source` of
/// [`Error::LoadFailure`].
#[derive(Debug)]
pub struct LoaderError(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
