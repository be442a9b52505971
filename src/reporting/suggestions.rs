//! Actionable suggestions for error resolution.
//!
//! Defines the suggestion data model and the process-wide registry of
//! suggestion providers consulted by the error reporters.
use log::warn;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::RwLock;

use crate::error::{ErrorKind, TaskForgeError};

/// Severity levels for error suggestions, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Categories for error suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    Configuration,
    Connection,
    Authentication,
    Permission,
    Data,
    Format,
    Compatibility,
    Dependency,
    System,
    Usage,
    General,
}

/// A specific, actionable suggestion to resolve an error.
///
/// A suggestion applies to an error when its kind list contains the
/// error's kind or any of its text patterns appears in the error's message
/// (case-insensitive); when both lists are present both must hold, and a
/// suggestion with neither always applies.
#[derive(Debug, Clone, Serialize)]
pub struct ActionableSuggestion {
    /// Headline advice shown to the user
    pub message: String,
    /// Ordered remediation steps
    pub steps: Vec<String>,
    /// Severity of the underlying problem
    pub severity: SuggestionSeverity,
    /// Problem category
    pub category: SuggestionCategory,
    /// Optional snippet demonstrating the fix
    pub code_example: Option<String>,
    /// Optional link to further documentation
    pub documentation_url: Option<String>,
    /// Whether applying the fix requires a restart
    pub requires_restart: bool,
    /// Rough fix-time estimate, e.g. "1-5 minutes"
    pub estimated_fix_time: Option<String>,
    /// Case-insensitive substrings matched against the error text
    #[serde(skip)]
    pub error_patterns: Vec<String>,
    /// Error kinds this suggestion applies to
    #[serde(skip)]
    pub applies_to_kinds: Vec<ErrorKind>,
}

impl ActionableSuggestion {
    /// Create a suggestion with medium severity and the general category.
    pub fn new<S, I, T>(message: S, steps: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            message: message.into(),
            steps: steps.into_iter().map(Into::into).collect(),
            severity: SuggestionSeverity::Medium,
            category: SuggestionCategory::General,
            code_example: None,
            documentation_url: None,
            requires_restart: false,
            estimated_fix_time: None,
            error_patterns: Vec::new(),
            applies_to_kinds: Vec::new(),
        }
    }

    /// Set the severity.
    pub fn severity(mut self, severity: SuggestionSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the category.
    pub fn category(mut self, category: SuggestionCategory) -> Self {
        self.category = category;
        self
    }

    /// Attach a code example.
    pub fn code_example<S: Into<String>>(mut self, example: S) -> Self {
        self.code_example = Some(example.into());
        self
    }

    /// Attach a documentation link.
    pub fn documentation_url<S: Into<String>>(mut self, url: S) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    /// Mark the fix as requiring a restart.
    pub fn requires_restart(mut self) -> Self {
        self.requires_restart = true;
        self
    }

    /// Attach a fix-time estimate.
    pub fn estimated_fix_time<S: Into<String>>(mut self, estimate: S) -> Self {
        self.estimated_fix_time = Some(estimate.into());
        self
    }

    /// Add a text pattern this suggestion applies to.
    pub fn pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.error_patterns.push(pattern.into());
        self
    }

    /// Add an error kind this suggestion applies to.
    pub fn kind(mut self, kind: ErrorKind) -> Self {
        self.applies_to_kinds.push(kind);
        self
    }

    /// Whether this suggestion applies to the given error.
    pub fn matches_error(&self, error: &TaskForgeError, error_text: &str) -> bool {
        if self.applies_to_kinds.is_empty() && self.error_patterns.is_empty() {
            return true;
        }

        let kind_match = self.applies_to_kinds.contains(&error.kind());
        let text_lower = error_text.to_lowercase();
        let pattern_match = self
            .error_patterns
            .iter()
            .any(|pattern| text_lower.contains(&pattern.to_lowercase()));

        match (
            self.applies_to_kinds.is_empty(),
            self.error_patterns.is_empty(),
        ) {
            (false, false) => kind_match && pattern_match,
            (false, true) => kind_match,
            (true, false) => pattern_match,
            (true, true) => true,
        }
    }
}

/// A provider producing suggestions for an error. Receives the error and
/// its rendered text (`Kind: message`).
pub type SuggestionProvider = fn(&TaskForgeError, &str) -> Vec<ActionableSuggestion>;

static PROVIDERS: Lazy<RwLock<Vec<SuggestionProvider>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register a suggestion provider with the process-wide registry.
pub fn register_provider(provider: SuggestionProvider) {
    PROVIDERS.write().unwrap().push(provider);
}

/// Rendered error text handed to providers.
pub fn error_text(error: &TaskForgeError) -> String {
    format!("{}: {}", error.kind(), error)
}

/// Collect suggestions for an error from every registered provider,
/// sorted by severity (most severe first). Providers that panic are
/// logged and skipped.
pub fn suggestions_for(error: &TaskForgeError) -> Vec<ActionableSuggestion> {
    super::providers::register_default_providers();
    let text = error_text(error);
    let providers = PROVIDERS.read().unwrap().clone();

    let mut suggestions = Vec::new();
    for provider in providers {
        match std::panic::catch_unwind(AssertUnwindSafe(|| provider(error, &text))) {
            Ok(provided) => suggestions.extend(provided),
            Err(_) => warn!("suggestion provider panicked; skipping"),
        }
    }
    suggestions.sort_by_key(|suggestion| suggestion.severity);
    suggestions
}
