//! API credentials
//!
//! Tokens live in `~/.config/revloop/secrets.toml`, apart from the shareable
//! config, and the file must not be readable by group or others. Environment
//! variables (`GITHUB_TOKEN`, `REVLOOP_LLM_API_KEY` or `GROQ_API_KEY`,
//! `PINECONE_API_KEY`) take precedence over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Credentials for the services a review run talks to
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub personal access token
    pub github: TokenSecret,

    /// LLM provider API key
    pub llm: TokenSecret,

    /// Pinecone API key
    pub pinecone: TokenSecret,
}

/// A single credential
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSecret {
    pub token: Option<String>,
}

/// Written by [`Secrets::create_template`]
const TEMPLATE: &str = r#"# revloop credentials
# Keep this file private: chmod 600, never commit it.

[github]
# Token with pull request read and issue comment write access
token = ""

[llm]
# Key for the OpenAI-compatible endpoint (Groq by default)
token = ""

[pinecone]
# Leave empty to review without retrieved context
token = ""
"#;

impl Secrets {
    /// Secrets from the default file, or empty secrets when there is none
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Read a secrets file, refusing one readable by group or others
    pub fn load_from_file(path: &Path) -> Result<Self> {
        check_permissions(path)?;

        let contents = std::fs::read_to_string(path)?;
        let mut secrets: Secrets = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Invalid secrets file {}: {}", path.display(), e))
        })?;

        for secret in [&mut secrets.github, &mut secrets.llm, &mut secrets.pinecone] {
            secret.token = secret.token.take().map(|t| t.trim().to_string());
        }

        Ok(secrets)
    }

    /// `~/.config/revloop/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revloop").join("secrets.toml"))
    }

    /// GitHub token, GITHUB_TOKEN env var first
    pub fn github_token(&self) -> Option<String> {
        resolve(&["GITHUB_TOKEN"], &self.github, "GitHub token")
    }

    /// LLM API key, REVLOOP_LLM_API_KEY then GROQ_API_KEY first
    pub fn llm_api_key(&self) -> Option<String> {
        resolve(&["REVLOOP_LLM_API_KEY", "GROQ_API_KEY"], &self.llm, "LLM API key")
    }

    /// Pinecone API key, PINECONE_API_KEY env var first
    pub fn pinecone_api_key(&self) -> Option<String> {
        resolve(&["PINECONE_API_KEY"], &self.pinecone, "Pinecone API key")
    }

    /// Write an empty secrets file with mode 0600 at the default location
    pub fn create_template() -> Result<PathBuf> {
        let path = Self::default_secrets_path()
            .ok_or_else(|| Error::Config("No config directory on this platform".to_string()))?;
        Self::create_template_at(&path)?;
        Ok(path)
    }

    /// Write an empty secrets file with mode 0600 at `path`
    pub fn create_template_at(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(Error::Config(format!(
                "{} already exists, edit it instead",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, TEMPLATE)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        warn!(path = %path.display(), "Created secrets template, add your tokens to it");
        Ok(())
    }
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(Error::Config(format!(
            "{} has insecure permissions {:o}, run: chmod 600 {}",
            path.display(),
            mode,
            path.display()
        )));
    }
    debug!(path = %path.display(), mode = format!("{:o}", mode), "Secrets file permissions OK");
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn resolve(env_vars: &[&str], file: &TokenSecret, what: &str) -> Option<String> {
    for var in env_vars {
        if let Ok(token) = std::env::var(var) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                debug!(var, "Using {} from environment", what);
                return Some(token);
            }
        }
    }

    match file.token {
        Some(ref token) if !token.is_empty() => {
            debug!("Using {} from secrets file", what);
            Some(token.clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_secrets() {
        let secrets = Secrets::default();
        assert!(secrets.github.token.is_none());
        assert!(secrets.llm.token.is_none());
        assert!(secrets.pinecone.token.is_none());
    }

    #[test]
    fn test_parse_secrets() {
        let toml = r#"
[github]
token = "ghp_xxxxxxxxxxxx"

[llm]
token = "gsk_yyyy"
"#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.github.token, Some("ghp_xxxxxxxxxxxx".to_string()));
        assert_eq!(secrets.llm.token, Some("gsk_yyyy".to_string()));
        assert!(secrets.pinecone.token.is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_file() {
        let file = TokenSecret {
            token: Some("from_file".to_string()),
        };
        let token = resolve(&["REVLOOP_TEST_UNSET_SECRET_VAR"], &file, "test");
        assert_eq!(token, Some("from_file".to_string()));

        let empty = TokenSecret {
            token: Some(String::new()),
        };
        assert!(resolve(&["REVLOOP_TEST_UNSET_SECRET_VAR"], &empty, "test").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"test\"").unwrap();

        let perms = std::fs::Permissions::from_mode(0o644);
        std::fs::set_permissions(file.path(), perms).unwrap();

        let result = Secrets::load_from_file(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("insecure permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_secure_permissions_trim_tokens() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"  ghp_test  \"\n[pinecone]\ntoken = \"pc\"").unwrap();

        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(file.path(), perms).unwrap();

        let secrets = Secrets::load_from_file(file.path()).unwrap();
        assert_eq!(secrets.github.token, Some("ghp_test".to_string()));
        assert_eq!(secrets.pinecone.token, Some("pc".to_string()));
    }

    #[test]
    fn test_template_loads_and_is_not_overwritten() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("revloop").join("secrets.toml");

        Secrets::create_template_at(&path).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.github.token.as_deref(), Some(""));
        assert!(resolve(&["REVLOOP_TEST_UNSET_SECRET_VAR"], &secrets.llm, "test").is_none());

        let err = Secrets::create_template_at(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
