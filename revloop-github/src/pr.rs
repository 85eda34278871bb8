//! Pull request metadata, diffs and comments

use crate::{Error, GitHubClient, Result};
use chrono::{DateTime, Utc};
use octocrab::models::pulls::PullRequest as OctocrabPR;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Pull request metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// PR number
    pub number: u64,
    /// PR title
    pub title: String,
    /// Current state (open, closed)
    pub state: PrState,
    /// Whether the PR has been merged (derived from merged_at)
    pub merged: bool,
    /// When the PR was last updated
    pub updated_at: Option<DateTime<Utc>>,
    /// Head branch name
    pub head_branch: String,
    /// Base branch name
    pub base_branch: String,
}

/// PR state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

impl From<octocrab::models::IssueState> for PrState {
    fn from(state: octocrab::models::IssueState) -> Self {
        match state {
            octocrab::models::IssueState::Closed => PrState::Closed,
            _ => PrState::Open,
        }
    }
}

impl From<OctocrabPR> for PullRequestInfo {
    fn from(pr: OctocrabPR) -> Self {
        PullRequestInfo {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            state: pr.state.map(|s| s.into()).unwrap_or(PrState::Open),
            merged: pr.merged_at.is_some(),
            updated_at: pr.updated_at,
            head_branch: pr.head.ref_field,
            base_branch: pr.base.ref_field,
        }
    }
}

/// Map a "Not Found" API response to [`Error::PrNotFound`]
fn not_found_as(number: u64) -> impl Fn(octocrab::Error) -> Error {
    move |e| match &e {
        octocrab::Error::GitHub { source, .. } if source.message.contains("Not Found") => {
            Error::PrNotFound(number)
        }
        _ => Error::Api(e),
    }
}

impl GitHubClient {
    /// Get pull request metadata by number
    pub async fn get_pr(&self, number: u64) -> Result<PullRequestInfo> {
        debug!(number, "Fetching pull request");

        let pr = self
            .client()
            .pulls(self.owner(), self.repo())
            .get(number)
            .await
            .map_err(not_found_as(number))?;

        Ok(pr.into())
    }

    /// Get the unified diff of a pull request
    pub async fn get_pr_diff(&self, number: u64) -> Result<String> {
        debug!(number, "Fetching pull request diff");

        let diff = self
            .client()
            .pulls(self.owner(), self.repo())
            .get_diff(number)
            .await
            .map_err(not_found_as(number))?;

        info!(number, chars = diff.len(), "Fetched diff");
        Ok(diff)
    }

    /// Post a comment on the pull request conversation
    pub async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        debug!(number, chars = body.len(), "Posting comment");

        let comment = self
            .client()
            .issues(self.owner(), self.repo())
            .create_comment(number, body)
            .await
            .map_err(not_found_as(number))?;

        info!(number, comment_id = %comment.id, "Posted comment");
        Ok(())
    }
}
