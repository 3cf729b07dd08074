use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;

/// Outcome of a single fetch attempt.
pub type FetchResult<Data> = Result<Data, FetchError>;

/// Failure classes a fetch attempt can be normalized into.
///
/// Transport errors, decode errors and timeouts are all recovered by the
/// cache into a stale snapshot; the kind is only kept for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, TLS or HTTP status failure while talking to the remote.
    Transport,
    /// Response was received but its body could not be decoded.
    Decode,
    /// The attempt did not complete within the configured time limit.
    Timeout,
}

/// Error returned by a failed fetch attempt.
#[derive(Debug)]
pub struct FetchError {
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl FetchError {
    pub fn transport(source: impl Error + Send + Sync + 'static) -> Self {
        FetchError {
            kind: ErrorKind::Transport,
            source: Some(Box::new(source)),
        }
    }

    pub fn decode(source: impl Error + Send + Sync + 'static) -> Self {
        FetchError {
            kind: ErrorKind::Decode,
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout() -> Self {
        FetchError {
            kind: ErrorKind::Timeout,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Transport => write!(f, "transport error while fetching remote data"),
            ErrorKind::Decode => write!(f, "failed to decode fetched response body"),
            ErrorKind::Timeout => write!(f, "fetch attempt timed out"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Remote data fetcher trait.
/// A fetcher performs one attempt to load a value from an external source.
/// # Errors
/// All failure modes must be normalized into [`FetchError`] by the
/// implementation; the cache treats every error as a recoverable degradation.
pub trait Fetcher<Data: Send + Sync> {
    /// Try to load data
    fn fetch(&self) -> impl Future<Output = FetchResult<Data>> + Send;
}

/// [`Fetcher`] backed by a plain async closure, for callers that do not want
/// to implement the trait themselves.
pub struct FnFetcher<F> {
    f: F,
}

/// Wraps a fetch function into a [`Fetcher`].
pub fn fetch_with<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

impl<Data, F, Fut> Fetcher<Data> for FnFetcher<F>
where
    Data: Send + Sync,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult<Data>> + Send,
{
    fn fetch(&self) -> impl Future<Output = FetchResult<Data>> + Send {
        (self.f)()
    }
}
