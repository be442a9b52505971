//! Error reporting with actionable suggestions.
//!
//! Reporters enrich a raw [`TaskForgeError`] with context and suggestions
//! and render the result to the console or to a timestamped report file.
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::suggestions::{ActionableSuggestion, SuggestionSeverity, suggestions_for};
use crate::Result;
use crate::error::TaskForgeError;

/// Output format for file-based error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    /// File extension used for reports in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Context information about an error occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: DateTime<Local>,
    /// Operation in progress when the error occurred
    pub operation: Option<String>,
    /// Component reporting the error
    pub component: Option<String>,
    /// What the user was doing
    pub user_action: Option<String>,
    /// Environment snapshot (crate version, OS)
    pub environment: HashMap<String, String>,
    /// Relevant input values
    pub inputs: HashMap<String, Value>,
}

impl ErrorContext {
    /// Create a context stamped now with a basic environment snapshot.
    pub fn new() -> Self {
        let timestamp = Local::now();
        let mut environment = HashMap::new();
        environment.insert("crate_version".to_string(), crate::VERSION.to_string());
        environment.insert("os".to_string(), std::env::consts::OS.to_string());
        environment.insert("timestamp".to_string(), timestamp.to_rfc3339());
        Self {
            timestamp,
            operation: None,
            component: None,
            user_action: None,
            environment,
            inputs: HashMap::new(),
        }
    }

    /// Name the operation in progress.
    pub fn operation<S: Into<String>>(mut self, operation: S) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Name the reporting component.
    pub fn component<S: Into<String>>(mut self, component: S) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Describe the user action that triggered the error.
    pub fn user_action<S: Into<String>>(mut self, action: S) -> Self {
        self.user_action = Some(action.into());
        self
    }

    /// Attach an input value.
    pub fn input<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An error report with context and suggestions.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedError {
    /// The original error
    #[serde(skip_serializing)]
    pub error: TaskForgeError,
    /// Kind name of the error
    pub error_type: String,
    /// Rendered error message
    pub error_message: String,
    /// Occurrence context
    pub context: ErrorContext,
    /// Suggestions sorted most severe first
    pub suggestions: Vec<ActionableSuggestion>,
}

impl ReportedError {
    /// Build a report for an error, optionally collecting suggestions.
    pub fn new(
        error: TaskForgeError,
        context: ErrorContext,
        include_suggestions: bool,
    ) -> Self {
        let suggestions = if include_suggestions {
            suggestions_for(&error)
        } else {
            Vec::new()
        };
        Self {
            error_type: error.kind().name().to_string(),
            error_message: error.to_string(),
            error,
            context,
            suggestions,
        }
    }

    /// Serialize the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

/// Interface for error reporters.
pub trait ErrorReporter {
    /// Report an error with context and suggestions.
    fn report_error(
        &self,
        error: TaskForgeError,
        context: Option<ErrorContext>,
        include_suggestions: bool,
    ) -> Result<ReportedError>;
}

/// Reporter that prints errors to stderr with optional coloring.
pub struct ConsoleErrorReporter {
    /// Whether to use ANSI colors
    pub colored_output: bool,
    /// Whether to print context and code examples
    pub verbose: bool,
}

impl ConsoleErrorReporter {
    /// Create a reporter with colors on and verbose off.
    pub fn new() -> Self {
        Self {
            colored_output: true,
            verbose: false,
        }
    }

    /// Toggle colored output.
    pub fn colored(mut self, enabled: bool) -> Self {
        self.colored_output = enabled;
        self
    }

    /// Toggle verbose output.
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    fn style(&self, text: &str, color: &str) -> String {
        if !self.colored_output {
            return text.to_string();
        }
        match color {
            "red" => text.red().to_string(),
            "yellow" => text.yellow().to_string(),
            "green" => text.green().to_string(),
            "cyan" => text.cyan().to_string(),
            "blue" => text.blue().to_string(),
            "magenta" => text.magenta().to_string(),
            _ => text.to_string(),
        }
    }

    fn severity_color(severity: SuggestionSeverity) -> &'static str {
        match severity {
            SuggestionSeverity::Critical | SuggestionSeverity::High => "red",
            SuggestionSeverity::Medium => "yellow",
            SuggestionSeverity::Low => "cyan",
            SuggestionSeverity::Info => "blue",
        }
    }
}

impl Default for ConsoleErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for ConsoleErrorReporter {
    fn report_error(
        &self,
        error: TaskForgeError,
        context: Option<ErrorContext>,
        include_suggestions: bool,
    ) -> Result<ReportedError> {
        let context = context.unwrap_or_default();
        let report = ReportedError::new(error, context, include_suggestions);

        let mut header = format!("ERROR: {}", report.error_type);
        if let Some(component) = &report.context.component {
            let _ = write!(header, " in {}", component);
        }
        eprintln!("{}", self.style(&header, "red"));
        eprintln!("{}", self.style(&"=".repeat(header.len()), "red"));
        eprintln!("{}", self.style(&report.error_message, "yellow"));
        eprintln!();

        if self.verbose {
            eprintln!("{}", self.style("Context:", "cyan"));
            if let Some(operation) = &report.context.operation {
                eprintln!("  Operation: {}", operation);
            }
            if let Some(action) = &report.context.user_action {
                eprintln!("  User Action: {}", action);
            }
            if !report.context.inputs.is_empty() {
                eprintln!("  Inputs: {:?}", report.context.inputs);
            }
            eprintln!();
        }

        if !report.suggestions.is_empty() {
            eprintln!("{}", self.style("Suggested actions:", "green"));
            for (index, suggestion) in report.suggestions.iter().enumerate() {
                let color = Self::severity_color(suggestion.severity);
                eprintln!(
                    "{}. {}",
                    index + 1,
                    self.style(&suggestion.message, color)
                );
                for (step_index, step) in suggestion.steps.iter().enumerate() {
                    eprintln!("   {}. {}", step_index + 1, step);
                }
                if let Some(url) = &suggestion.documentation_url {
                    eprintln!("   {} {}", self.style("For more information:", "blue"), url);
                }
                if self.verbose && let Some(example) = &suggestion.code_example {
                    eprintln!("\n   {}\n", self.style("Example:", "cyan"));
                    for line in example.lines() {
                        eprintln!("     {}", line);
                    }
                }
                eprintln!();
            }
        }

        Ok(report)
    }
}

/// Reporter that writes detailed error reports to files.
///
/// Reports land in `<output_dir>/error_<Kind>_<YYYYMMDD_HHMMSS>.<json|txt>`;
/// non-alphanumeric characters in the kind name are replaced with `_`.
pub struct FileErrorReporter {
    /// Directory receiving report files
    pub output_dir: PathBuf,
    /// Report format
    pub format: ReportFormat,
    /// Whether to print the report path to stderr
    pub log_to_stderr: bool,
}

impl FileErrorReporter {
    /// Create a reporter writing JSON reports into `output_dir`.
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: ReportFormat::Json,
            log_to_stderr: true,
        }
    }

    /// Set the report format.
    pub fn format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle the stderr notice.
    pub fn log_to_stderr(mut self, enabled: bool) -> Self {
        self.log_to_stderr = enabled;
        self
    }

    fn generate_filename(&self, error_type: &str, timestamp: DateTime<Local>) -> String {
        let sanitized: String = error_type
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!(
            "error_{}_{}.{}",
            sanitized,
            timestamp.format("%Y%m%d_%H%M%S"),
            self.format.extension()
        )
    }

    fn render_text(report: &ReportedError) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ERROR: {}", report.error_type);
        let _ = writeln!(out, "Message: {}", report.error_message);
        let _ = writeln!(out, "Timestamp: {}", report.context.timestamp.to_rfc3339());
        if let Some(component) = &report.context.component {
            let _ = writeln!(out, "Component: {}", component);
        }
        if let Some(operation) = &report.context.operation {
            let _ = writeln!(out, "Operation: {}", operation);
        }
        if let Some(action) = &report.context.user_action {
            let _ = writeln!(out, "User Action: {}", action);
        }
        let _ = writeln!(out);
        if !report.suggestions.is_empty() {
            let _ = writeln!(out, "Suggested actions:");
            for (index, suggestion) in report.suggestions.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", index + 1, suggestion.message);
                let _ = writeln!(out, "   Severity: {:?}", suggestion.severity);
                let _ = writeln!(out, "   Category: {:?}", suggestion.category);
                let _ = writeln!(out, "   Steps:");
                for (step_index, step) in suggestion.steps.iter().enumerate() {
                    let _ = writeln!(out, "    {}. {}", step_index + 1, step);
                }
                if let Some(url) = &suggestion.documentation_url {
                    let _ = writeln!(out, "   Documentation: {}", url);
                }
                if let Some(example) = &suggestion.code_example {
                    let _ = writeln!(out, "   Example:");
                    for line in example.lines() {
                        let _ = writeln!(out, "     {}", line);
                    }
                }
                let _ = writeln!(out);
            }
        }
        out
    }
}

impl ErrorReporter for FileErrorReporter {
    fn report_error(
        &self,
        error: TaskForgeError,
        context: Option<ErrorContext>,
        include_suggestions: bool,
    ) -> Result<ReportedError> {
        let context = context.unwrap_or_default();
        let report = ReportedError::new(error, context, include_suggestions);

        std::fs::create_dir_all(&self.output_dir)?;
        let filename = self.generate_filename(&report.error_type, report.context.timestamp);
        let path = self.output_dir.join(&filename);
        let contents = match self.format {
            ReportFormat::Json => report.to_json()?,
            ReportFormat::Text => Self::render_text(&report),
        };
        std::fs::write(&path, contents)?;

        if self.log_to_stderr {
            eprintln!("Error report written to: {}", path.display());
        }
        Ok(report)
    }
}
