//! Suggestion-driven error reporting.
//!
//! This module enriches raw failures with actionable advice:
//!
//! - [`suggestions`] — the suggestion data model and the process-wide
//!   provider registry
//! - [`providers`] — built-in providers for connection, configuration,
//!   filesystem, task execution, and cache usage problems
//! - [`reporter`] — console and file reporters rendering a
//!   [`ReportedError`] with severity-colored suggestions
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use taskforge::error::TaskForgeError;
//! use taskforge::reporting::{ConsoleErrorReporter, ErrorReporter};
//!
//! let reporter = ConsoleErrorReporter::new();
//! let error = TaskForgeError::cache_io("permission denied: /var/cache");
//! let report = reporter.report_error(error, None, true)?;
//! assert!(!report.suggestions.is_empty());
//! ```

pub mod providers;
pub mod reporter;
pub mod suggestions;

pub use providers::register_default_providers;
pub use reporter::{
    ConsoleErrorReporter, ErrorContext, ErrorReporter, FileErrorReporter, ReportFormat,
    ReportedError,
};
pub use suggestions::{
    ActionableSuggestion, SuggestionCategory, SuggestionProvider, SuggestionSeverity,
    register_provider, suggestions_for,
};
