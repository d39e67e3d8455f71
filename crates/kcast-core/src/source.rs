// Provider capability implemented by every external data source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {source_name} failed: {message}")]
    Request { source_name: String, message: String },

    #[error("malformed response from {source_name}: {message}")]
    Malformed { source_name: String, message: String },

    #[error("{source_name} timed out after {timeout:?}")]
    Timeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("{source_name} gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        source_name: String,
        attempts: u32,
        last_error: String,
    },
}

impl SourceError {
    pub fn request(source_name: &str, message: impl Into<String>) -> Self {
        SourceError::Request {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(source_name: &str, message: impl Into<String>) -> Self {
        SourceError::Malformed {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// A single external source for one kind of fact.
///
/// `Ok(None)` means the source answered but has nothing for this identity;
/// `Err` means the attempt itself failed and may be retried.
#[async_trait]
pub trait Source<T>: Send + Sync {
    /// Stable tag recorded as the provenance of values this source produces.
    fn name(&self) -> &str;

    async fn fetch(&self, identity: &str) -> Result<Option<T>, SourceError>;
}

#[async_trait]
impl<T, S> Source<T> for Arc<S>
where
    S: Source<T> + ?Sized,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self, identity: &str) -> Result<Option<T>, SourceError> {
        (**self).fetch(identity).await
    }
}

/// Shared handle to a source, as held in provider lists.
pub type SharedSource<T> = Arc<dyn Source<T>>;
