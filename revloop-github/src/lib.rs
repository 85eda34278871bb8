//! Revloop GitHub - GitHub integration for revloop
//!
//! This crate fetches pull request metadata and diffs and posts review
//! comments, implementing [`revloop_core::PullRequestHost`].

mod client;
mod error;
mod pr;

pub use client::{parse_github_url, GitHubClient};
pub use error::{Error, Result};
pub use pr::{PrState, PullRequestInfo};
