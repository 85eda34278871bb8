//! GitHub API client using octocrab

use crate::{Error, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use revloop_core::{PullRequestHost, Secrets};
use tracing::{debug, info};

/// GitHub API client bound to one repository
pub struct GitHubClient {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a client for `owner/repo` authenticated with `token`
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let owner = owner.into();
        let repo = repo.into();

        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(owner = %owner, repo = %repo, "Created GitHub client");

        Ok(Self {
            client,
            owner,
            repo,
        })
    }

    /// Create a client from a repository string and the loaded secrets
    ///
    /// The repository may be `owner/repo`, an HTTPS URL or an SSH URL. The token
    /// comes from `GITHUB_TOKEN` or `~/.config/revloop/secrets.toml`.
    pub fn from_secrets(repository: &str, secrets: &Secrets) -> Result<Self> {
        let (owner, repo) = parse_github_url(repository)?;

        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/revloop/secrets.toml"
                    .to_string(),
            )
        })?;

        Self::new(owner, repo, token)
    }

    /// Get the repository owner
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the repository name
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PullRequestHost for GitHubClient {
    async fn fetch_diff(&self, pr_number: u64) -> revloop_core::Result<String> {
        let pr = self.get_pr(pr_number).await?;
        debug!(pr = pr.number, title = %pr.title, state = ?pr.state, "Pull request found");
        Ok(self.get_pr_diff(pr_number).await?)
    }

    async fn post_comment(&self, pr_number: u64, body: &str) -> revloop_core::Result<()> {
        Ok(self.create_comment(pr_number, body).await?)
    }
}

/// Split a repository string into owner and name
///
/// Accepts `owner/repo`, `https://github.com/owner/repo[.git]` and
/// `git@github.com:owner/repo.git`. Anything after the repo segment of an
/// HTTPS URL (e.g. `/pull/12`) is ignored.
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    let url = url.trim();

    let path = if url.starts_with("https://") || url.starts_with("http://") {
        let parsed = url::Url::parse(url).map_err(|e| Error::Parse(e.to_string()))?;
        let segments: Vec<&str> = parsed
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .take(2)
            .collect();
        segments.join("/")
    } else if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')
            .map(|(_, path)| path.to_string())
            .ok_or_else(|| Error::Parse(format!("Invalid SSH URL: {}", url)))?
    } else {
        url.to_string()
    };

    owner_repo(&path)
        .ok_or_else(|| Error::Parse(format!("Invalid repository {:?}, expected owner/repo", url)))
}

fn owner_repo(path: &str) -> Option<(String, String)> {
    let (owner, repo) = path.trim_end_matches('/').split_once('/')?;
    let repo = repo.trim_end_matches(".git");
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
