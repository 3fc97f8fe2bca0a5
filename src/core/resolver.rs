use crate::core::change_set::{ChangedFile, ReviewableFile};
use crate::core::event::RunContext;
use crate::core::github::GitHubClient;
use crate::error::ReviewResult;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

/// Somewhere file bodies can be read from at a given revision.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn file_content(&self, context: &RunContext, path: &str) -> ReviewResult<String>;
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn file_content(&self, context: &RunContext, path: &str) -> ReviewResult<String> {
        self.get_file_content(&context.owner, &context.repo, path, &context.head_sha)
            .await
    }
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub files: Vec<ReviewableFile>,
    pub dropped: Vec<String>,
    /// One message per dropped file, for workflow annotations.
    pub warnings: Vec<String>,
}

pub struct ContentResolver<'a> {
    source: &'a dyn ContentSource,
}

impl<'a> ContentResolver<'a> {
    pub fn new(source: &'a dyn ContentSource) -> Self {
        Self { source }
    }

    /// Fetches every file concurrently and waits for all of them.
    ///
    /// Failed fetches are logged and dropped; successes keep listing order.
    pub async fn resolve(&self, context: &RunContext, files: Vec<ChangedFile>) -> Resolution {
        let fetches = files.iter().map(|file| self.source.file_content(context, &file.path));
        let results = join_all(fetches).await;

        let mut resolution = Resolution::default();
        for (file, result) in files.into_iter().zip(results) {
            match result {
                Ok(content) => resolution.files.push(ReviewableFile { file, content }),
                Err(e) => {
                    let message = e.to_string();
                    warn!("{}", message);
                    resolution.warnings.push(message);
                    resolution.dropped.push(file.path);
                }
            }
        }
        resolution
    }
}
