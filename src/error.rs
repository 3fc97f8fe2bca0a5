use thiserror::Error;

/// Every way a review run can fail.
///
/// Only `ContentFetch` is recovered (the file is dropped from the review);
/// all other variants end the run.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid trigger event: {0}")]
    Trigger(String),

    #[error("failed to fetch pull request from host: {0}")]
    HostFetch(String),

    #[error("failed to get content for {path}: {reason}")]
    ContentFetch { path: String, reason: String },

    #[error("{dropped} file(s) could not be fetched, more than the allowed {limit}: {paths}")]
    DropLimit {
        dropped: usize,
        limit: usize,
        paths: String,
    },

    #[error("review backend failed: {0}")]
    Backend(String),

    #[error("failed to publish comment: {0}")]
    Publish(String),
}

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;
