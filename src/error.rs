use std::{any::Any, error::Error as StdError, fmt, sync::Arc, time::Duration};
use thiserror::Error;

/// Boxed error accepted wherever a caller hands us the reason a computation failed.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// The failure side of every promise outcome.
///
/// A failed computation keeps the original error as its cause:
/// [`std::error::Error::source`] on a `Computation` error returns that
/// original error, so it can be downcast to its concrete type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Computation(Cause),
    #[error("promise timed out after {0:?}")]
    Timeout(Duration),
    #[error("promise already completed")]
    AlreadyCompleted,
    #[error("{failed} of {total} promises failed, first: {first}")]
    Aggregate {
        failed: usize,
        total: usize,
        #[source]
        first: Box<Error>,
    },
    #[error("executor has been shut down")]
    ExecutorShutdown,
}

impl Error {
    /// Wraps an arbitrary error as a computation failure.
    pub fn computation<E: Into<BoxError>>(err: E) -> Self {
        Error::Computation(Cause::new(err))
    }

    /// The original error behind this failure, if there is one.
    ///
    /// For an aggregate failure this is the cause of the first failure observed.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Error::Computation(cause) => Some(cause),
            Error::Aggregate { first, .. } => Error::cause(first),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Shared handle to the error a unit of work failed with.
///
/// The same failure is handed to every reader of a promise, so the original
/// error lives behind an `Arc`.
#[derive(Clone)]
pub struct Cause(Arc<dyn StdError + Send + Sync + 'static>);

impl Cause {
    pub fn new<E: Into<BoxError>>(err: E) -> Self {
        Cause(Arc::from(err.into()))
    }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.is::<E>()
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cause").field(&self.0).finish()
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computation failed: {}", self.0)
    }
}

impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.0)
    }
}

/// Cause recorded when a user closure panics instead of returning.
#[derive(Debug, Clone, Error)]
#[error("task panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        PanicError { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<PanicError> for Error {
    fn from(err: PanicError) -> Self {
        Error::computation(err)
    }
}
