//! Code host abstraction

use async_trait::async_trait;

use crate::Result;

/// Where pull requests live
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Unified diff of a pull request
    ///
    /// A pull request that does not exist yields [`crate::Error::PrNotFound`].
    async fn fetch_diff(&self, pr_number: u64) -> Result<String>;

    /// Add a comment to the pull request conversation
    async fn post_comment(&self, pr_number: u64, body: &str) -> Result<()>;
}
