//! Static analysis of the files a pull request touches
//!
//! Changed paths come from the `+++ b/<path>` headers of the diff. Each
//! configured tool runs once over the changed files of the languages it
//! understands, inside a local checkout of the repository. The result is a
//! plain-text report meant for prompts; analysis never fails the review.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use humantime_serde::re::humantime::format_duration;
use regex::Regex;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

static CHANGED_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\+\+\+ b/(.+)$").expect("changed file pattern is valid"));

/// Message used when the diff has no analyzable files
pub const NO_FILES_MESSAGE: &str =
    "No recognizable programming language files found in PR diff to analyze.";

/// Languages the analyzers are mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
    Go,
    Kotlin,
    Rust,
    Ruby,
    Php,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "js" | "jsx" | "ts" | "tsx" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            "c" | "cpp" | "cc" | "cxx" | "h" | "hpp" => Some(Language::Cpp),
            "go" => Some(Language::Go),
            "kt" => Some(Language::Kotlin),
            "rs" => Some(Language::Rust),
            "rb" => Some(Language::Ruby),
            "php" => Some(Language::Php),
            _ => None,
        }
    }

    /// Language of a path, by extension
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, ext) = path.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

/// Changed files grouped by language, in diff order within each group
pub fn changed_files(diff: &str) -> BTreeMap<Language, Vec<String>> {
    let mut files: BTreeMap<Language, Vec<String>> = BTreeMap::new();
    for cap in CHANGED_FILE_RE.captures_iter(diff) {
        let path = cap[1].trim_end_matches('\r').to_string();
        if let Some(lang) = Language::from_path(&path) {
            let entry = files.entry(lang).or_default();
            if !entry.contains(&path) {
                entry.push(path);
            }
        }
    }
    files
}

/// Produces a static analysis report for a diff
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    /// Human-readable report; failures are described in the text
    async fn analyze(&self, diff: &str) -> String;
}

/// An external analyzer command
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Languages handled; empty means every language
    pub languages: Vec<Language>,
}

impl ToolSpec {
    pub fn new(name: &str, program: &str, args: &[&str], languages: &[Language]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            languages: languages.to_vec(),
        }
    }

    fn handles(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }
}

/// Tools run when none are configured explicitly
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("semgrep", "semgrep", &["--config", "auto", "--quiet"], &[]),
        ToolSpec::new("ruff", "ruff", &["check", "--no-fix"], &[Language::Python]),
        ToolSpec::new(
            "eslint",
            "npx",
            &["--no-install", "eslint"],
            &[Language::JavaScript],
        ),
    ]
}

/// Runs [`ToolSpec`]s in a local checkout
///
/// Tools run one after another and share a single time budget; a tool
/// started late only gets what is left of it.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    workdir: Option<PathBuf>,
    budget: Duration,
    tools: Vec<ToolSpec>,
}

impl CommandAnalyzer {
    pub fn new(workdir: Option<PathBuf>, budget: Duration) -> Self {
        Self {
            workdir,
            budget,
            tools: default_tools(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    async fn run_tool(
        &self,
        tool: &ToolSpec,
        workdir: &Path,
        files: &[String],
        limit: Duration,
    ) -> String {
        debug!(tool = %tool.name, files = files.len(), "Running analyzer");

        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args)
            .args(files)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Err(_) => {
                warn!(tool = %tool.name, "Analyzer timed out");
                return format!(
                    "| {}: timed out after {}",
                    tool.name,
                    format_duration(limit)
                );
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return format!("| {}: '{}' command not found", tool.name, tool.program);
            }
            Ok(Err(e)) => return format!("| {}: failed to run: {}", tool.name, e),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stdout.is_empty() {
            format!("| {} issues found:\n\n{}\n", tool.name, stdout)
        } else if output.status.success() && stderr.is_empty() {
            format!("| {}: no issues found.", tool.name)
        } else {
            format!("| {} output/error:\n{}", tool.name, stderr)
        }
    }
}

#[async_trait]
impl StaticAnalyzer for CommandAnalyzer {
    async fn analyze(&self, diff: &str) -> String {
        let by_language = changed_files(diff);
        if by_language.is_empty() {
            return NO_FILES_MESSAGE.to_string();
        }

        let Some(workdir) = self.workdir.as_ref().filter(|d| d.is_dir()) else {
            return "Static analysis skipped: no local checkout configured \
                    (run.static_analysis_dir)."
                .to_string();
        };

        let total: usize = by_language.values().map(Vec::len).sum();
        let mut sections = vec![format!("=== Static Analysis ({} files) ===", total)];
        let deadline = Instant::now() + self.budget;

        for tool in &self.tools {
            let files: Vec<String> = by_language
                .iter()
                .filter(|(lang, _)| tool.handles(**lang))
                .flat_map(|(_, files)| files.iter().cloned())
                .collect();
            if files.is_empty() {
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(tool = %tool.name, "Analysis budget used up, skipping tool");
                sections.push(format!(
                    "| {}: skipped, analysis budget of {} used up",
                    tool.name,
                    format_duration(self.budget)
                ));
                continue;
            }
            sections.push(self.run_tool(tool, workdir, &files, remaining).await);
        }

        sections.join("\n\n")
    }
}
