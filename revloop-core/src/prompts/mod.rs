//! Review prompt catalog
//!
//! Templates are embedded at build time and use `{{VARIABLE}}` placeholders.
//! Catalog order is part of the persisted selector state: candidates are
//! identified by their ordinal, so new templates are appended, never inserted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const STRUCTURED_PROMPT: &str = include_str!("templates/structured.md");
const CHECKLIST_PROMPT: &str = include_str!("templates/checklist.md");
const RISK_FOCUSED_PROMPT: &str = include_str!("templates/risk_focused.md");
const SENIOR_MENTOR_PROMPT: &str = include_str!("templates/senior_mentor.md");

/// Built-in templates in canonical order
const BUILTIN: [(&str, &str); 4] = [
    ("structured", STRUCTURED_PROMPT),
    ("checklist", CHECKLIST_PROMPT),
    ("risk_focused", RISK_FOCUSED_PROMPT),
    ("senior_mentor", SENIOR_MENTOR_PROMPT),
];

/// A prompt template the selector can choose
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptCandidate {
    /// Ordinal in the catalog
    pub index: usize,
    pub name: String,
}

/// Fixed, ordered set of prompt templates
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    entries: Vec<(String, String)>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptCatalog {
    /// The embedded review templates
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(name, template)| (name.to_string(), template.to_string()))
                .collect(),
        }
    }

    /// Catalog from explicit `(name, template)` pairs
    pub fn from_entries(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in canonical order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn candidate(&self, index: usize) -> Option<PromptCandidate> {
        self.entries.get(index).map(|(name, _)| PromptCandidate {
            index,
            name: name.clone(),
        })
    }

    pub fn candidates(&self) -> Vec<PromptCandidate> {
        (0..self.len()).filter_map(|i| self.candidate(i)).collect()
    }

    pub fn find(&self, name: &str) -> Option<PromptCandidate> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .and_then(|i| self.candidate(i))
    }

    /// Raw template text
    pub fn template(&self, candidate: &PromptCandidate) -> Option<&str> {
        self.entries
            .get(candidate.index)
            .filter(|(name, _)| *name == candidate.name)
            .map(|(_, template)| template.as_str())
    }
}

/// Variables substituted into a template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_diff(self, diff: impl Into<String>) -> Self {
        self.with("DIFF", diff)
    }

    pub fn with_static(self, output: impl Into<String>) -> Self {
        self.with("STATIC", output)
    }

    pub fn with_context(self, context: impl Into<String>) -> Self {
        self.with("CONTEXT", context)
    }
}

/// Render a template string with variable substitution
///
/// Placeholders are expanded in one pass, so substituted values are never
/// re-expanded. Unset uppercase placeholders become `(not specified)`.
pub fn render_template(template: &str, context: &PromptContext) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) if is_placeholder_name(&after[..end]) => {
                let key = &after[..end];
                rendered.push_str(&rest[..start]);
                match context.variables.get(key) {
                    Some(value) => rendered.push_str(value),
                    None => rendered.push_str("(not specified)"),
                }
                rest = &after[end + 2..];
            }
            _ => {
                rendered.push_str(&rest[..start + 2]);
                rest = after;
            }
        }
    }
    rendered.push_str(rest);

    rendered
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_is_stable() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(
            catalog.names(),
            vec!["structured", "checklist", "risk_focused", "senior_mentor"]
        );
        for (i, candidate) in catalog.candidates().iter().enumerate() {
            assert_eq!(candidate.index, i);
        }
    }

    #[test]
    fn test_builtin_templates_have_placeholders() {
        let catalog = PromptCatalog::builtin();
        for candidate in catalog.candidates() {
            let template = catalog.template(&candidate).unwrap();
            for placeholder in ["{{DIFF}}", "{{STATIC}}", "{{CONTEXT}}"] {
                assert!(
                    template.contains(placeholder),
                    "{} lacks {}",
                    candidate.name,
                    placeholder
                );
            }
        }
    }

    #[test]
    fn test_find_and_stale_candidate() {
        let catalog = PromptCatalog::builtin();
        let risk = catalog.find("risk_focused").unwrap();
        assert_eq!(risk.index, 2);
        assert!(catalog.find("missing").is_none());

        let stale = PromptCandidate {
            index: 2,
            name: "renamed".to_string(),
        };
        assert!(catalog.template(&stale).is_none());
    }

    #[test]
    fn test_render_template() {
        let context = PromptContext::new()
            .with_diff("+fn main() {}")
            .with_static("clean");
        let rendered = render_template("D={{DIFF}} S={{STATIC}} C={{CONTEXT}} {{keep}}", &context);
        assert_eq!(rendered, "D=+fn main() {} S=clean C=(not specified) {{keep}}");
    }

    #[test]
    fn test_render_does_not_expand_inserted_values() {
        let context = PromptContext::new().with_diff("literal {{STATIC}} in diff");
        let rendered = render_template("{{DIFF}}", &context);
        assert_eq!(rendered, "literal {{STATIC}} in diff");
    }
}
