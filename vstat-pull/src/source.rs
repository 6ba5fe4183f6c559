use std::time::Duration;

use vstat_common::{Sample, TagId};

/// An error returned by a [`DataSource`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The data source cannot produce samples for the tag right now.
    #[error("data source for tag {0} is unavailable")]
    Unavailable(TagId),
    /// The data source gave up waiting for the underlying service.
    #[error("data source timed out after {0:?}")]
    Timeout(Duration),
    /// Any other failure reported by the data source.
    #[error("data source failed: {0}")]
    Other(String),
}

/// Produces a snapshot of the current samples of a tag.
///
/// The returned samples do not need to carry meaningful timestamps, the [`PullCache`] stamps them.
/// Timeouts are the responsibility of the implementation, the cache waits for as long as the fetch
/// takes.
///
/// [`PullCache`]: crate::PullCache
pub trait DataSource: Send + Sync {
    /// Fetches all current samples of `tag`.
    fn fetch(&self, tag: TagId) -> Result<Vec<Sample>, FetchError>;
}

impl<F> DataSource for F
where
    F: Fn(TagId) -> Result<Vec<Sample>, FetchError> + Send + Sync,
{
    fn fetch(&self, tag: TagId) -> Result<Vec<Sample>, FetchError> {
        self(tag)
    }
}
