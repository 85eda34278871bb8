//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Pull request not found
    #[error("Pull request #{0} not found")]
    PrNotFound(u64),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<Error> for revloop_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::PrNotFound(number) => revloop_core::Error::PrNotFound(number),
            Error::Auth(msg) | Error::Parse(msg) => revloop_core::Error::Config(msg),
            Error::Api(e) => revloop_core::Error::Fetch(format!("GitHub API error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core_error() {
        let core: revloop_core::Error = Error::PrNotFound(9).into();
        assert!(matches!(core, revloop_core::Error::PrNotFound(9)));

        let core: revloop_core::Error = Error::Auth("no token".into()).into();
        assert!(core.is_fatal());
    }
}
