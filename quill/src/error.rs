use std::collections::TryReserveError;
use std::error::Error as StdError;

/// Errors surfaced by the instrumentation layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pooled-resource construction or scratch allocation failed.
    ///
    /// Fatal to the current call; the call is not retried.
    #[error("out of memory")]
    OutOfMemory,
    /// The underlying queue rejected a forwarded operation. The source error
    /// is passed through unchanged.
    #[error("queue backend error")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),
    /// The log sink failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an error reported by a downstream collaborator.
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Error {
        Error::Backend(Box::new(err))
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Error {
        Error::OutOfMemory
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
