//! Built-in suggestion providers.
//!
//! Each provider owns one problem area and contributes canned advice for
//! the errors it recognizes. Providers are registered once per process;
//! applications can add their own with
//! [`register_provider`](super::suggestions::register_provider).
use std::sync::Once;

use super::suggestions::{
    ActionableSuggestion, SuggestionCategory, SuggestionSeverity, register_provider,
};
use crate::error::{ErrorKind, TaskForgeError};

static REGISTER: Once = Once::new();

/// Register the built-in providers. Safe to call repeatedly.
pub fn register_default_providers() {
    REGISTER.call_once(|| {
        register_provider(connection_suggestions);
        register_provider(configuration_suggestions);
        register_provider(filesystem_suggestions);
        register_provider(task_execution_suggestions);
        register_provider(cache_usage_suggestions);
    });
}

fn matching(
    candidates: Vec<ActionableSuggestion>,
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    candidates
        .into_iter()
        .filter(|suggestion| suggestion.matches_error(error, error_text))
        .collect()
}

/// Advice for network and connectivity failures surfaced through task or
/// cache errors.
fn connection_suggestions(
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    let candidates = vec![
        ActionableSuggestion::new(
            "A network connection could not be established",
            [
                "Check that the target host is reachable from this machine",
                "Verify proxy and firewall settings",
                "Retry once connectivity is restored",
            ],
        )
        .severity(SuggestionSeverity::High)
        .category(SuggestionCategory::Connection)
        .pattern("connection refused")
        .pattern("unreachable")
        .pattern("network")
        .estimated_fix_time("1-5 minutes"),
        ActionableSuggestion::new(
            "The remote side took too long to respond",
            [
                "Retry the operation during a quieter period",
                "Raise the task timeout if the workload is legitimately slow",
            ],
        )
        .severity(SuggestionSeverity::Medium)
        .category(SuggestionCategory::Connection)
        .pattern("timed out"),
    ];
    matching(candidates, error, error_text)
}

/// Advice for configuration problems.
fn configuration_suggestions(
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    let candidates = vec![
        ActionableSuggestion::new(
            "The configuration contains an invalid or missing setting",
            [
                "Review the configuration file for the setting named in the message",
                "Check TASKFORGE_-prefixed environment variables for overrides",
                "Compare against the defaults produced by Config::default()",
            ],
        )
        .severity(SuggestionSeverity::High)
        .category(SuggestionCategory::Configuration)
        .kind(ErrorKind::Config)
        .code_example("let config = Config::load_from(Path::new(\"taskforge.toml\"))?;")
        .estimated_fix_time("1-5 minutes"),
        ActionableSuggestion::new(
            "The cache configuration was rejected",
            [
                "Ensure max_size is at least 1",
                "Ensure the namespace is a non-empty string",
            ],
        )
        .severity(SuggestionSeverity::High)
        .category(SuggestionCategory::Configuration)
        .kind(ErrorKind::CacheConfig),
    ];
    matching(candidates, error, error_text)
}

/// Advice for filesystem failures in the cache and report writers.
fn filesystem_suggestions(
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    let candidates = vec![
        ActionableSuggestion::new(
            "The process lacks permission for a cache or report path",
            [
                "Check ownership and permissions of the cache directory",
                "Point cache_dir at a writable location",
            ],
        )
        .severity(SuggestionSeverity::Critical)
        .category(SuggestionCategory::Permission)
        .pattern("permission denied")
        .pattern("read-only"),
        ActionableSuggestion::new(
            "A cache file or directory is missing or unreadable",
            [
                "Verify the cache root directory still exists",
                "Run cleanup_expired to drop stale registry entries",
                "Clear the affected cache instance if corruption persists",
            ],
        )
        .severity(SuggestionSeverity::Medium)
        .category(SuggestionCategory::System)
        .kind(ErrorKind::CacheIo),
        ActionableSuggestion::new(
            "Disk space may be exhausted",
            [
                "Check free space on the volume holding the cache root",
                "Lower max_size on the file cache tiers",
            ],
        )
        .severity(SuggestionSeverity::High)
        .category(SuggestionCategory::System)
        .pattern("no space left"),
    ];
    matching(candidates, error, error_text)
}

/// Advice for task execution failures.
fn task_execution_suggestions(
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    let candidates = vec![
        ActionableSuggestion::new(
            "The task exceeded its deadline",
            [
                "Raise the per-task timeout or the executor default",
                "Split the work into smaller tasks",
                "Check whether the computation yields often enough to be timed out cleanly",
            ],
        )
        .severity(SuggestionSeverity::High)
        .category(SuggestionCategory::Usage)
        .kind(ErrorKind::TaskTimeout)
        .estimated_fix_time("5-10 minutes"),
        ActionableSuggestion::new(
            "The task's computation returned an error",
            [
                "Inspect the captured failure message",
                "Resubmit with a new task identity once the cause is fixed; the executor does not retry",
            ],
        )
        .severity(SuggestionSeverity::Medium)
        .category(SuggestionCategory::Data)
        .kind(ErrorKind::TaskFailed),
        ActionableSuggestion::new(
            "A prerequisite task did not complete successfully",
            [
                "Find the prerequisite named in the message and inspect its failure",
                "Dependents of a failed prerequisite are cancelled transitively; fix the root cause and resubmit the chain",
            ],
        )
        .severity(SuggestionSeverity::Medium)
        .category(SuggestionCategory::Dependency)
        .kind(ErrorKind::DependencyNotSatisfied),
    ];
    matching(candidates, error, error_text)
}

/// Advice for cache and lifecycle misuse.
fn cache_usage_suggestions(
    error: &TaskForgeError,
    error_text: &str,
) -> Vec<ActionableSuggestion> {
    let candidates = vec![
        ActionableSuggestion::new(
            "An empty cache key was rejected",
            ["Build keys from non-empty strings or string tuples"],
        )
        .severity(SuggestionSeverity::Low)
        .category(SuggestionCategory::Usage)
        .kind(ErrorKind::CacheKey)
        .code_example("let key = CacheKey::from(vec![\"audit\".into(), url.clone()]);"),
        ActionableSuggestion::new(
            "Null values cannot be cached",
            ["Wrap optional results in an object before caching, or skip the set"],
        )
        .severity(SuggestionSeverity::Low)
        .category(SuggestionCategory::Usage)
        .kind(ErrorKind::CacheValue),
        ActionableSuggestion::new(
            "The executor was used outside its running lifecycle",
            [
                "Call start() before submitting or cancelling tasks",
                "Avoid submitting after stop() has begun",
            ],
        )
        .severity(SuggestionSeverity::Medium)
        .category(SuggestionCategory::Usage)
        .kind(ErrorKind::ExecutorState),
    ];
    matching(candidates, error, error_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::suggestions::suggestions_for;
    use std::time::Duration;

    #[test]
    fn test_timeout_error_gets_timeout_advice() {
        let error = TaskForgeError::task_timeout("t", Duration::from_secs(3));
        let suggestions = suggestions_for(&error);
        assert!(
            suggestions
                .iter()
                .any(|s| s.message.contains("exceeded its deadline"))
        );
    }

    #[test]
    fn test_permission_error_gets_permission_advice() {
        let error = TaskForgeError::cache_io("permission denied: /var/cache/taskforge");
        let suggestions = suggestions_for(&error);
        assert_eq!(
            suggestions[0].severity,
            SuggestionSeverity::Critical,
            "permission advice sorts first: {:?}",
            suggestions
        );
        assert_eq!(suggestions[0].category, SuggestionCategory::Permission);
    }

    #[test]
    fn test_unrelated_error_gets_no_connection_advice() {
        let error = TaskForgeError::cache_value("cache value cannot be null");
        let suggestions = suggestions_for(&error);
        assert!(
            suggestions
                .iter()
                .all(|s| s.category != SuggestionCategory::Connection)
        );
    }

    #[test]
    fn test_dependency_error_names_category() {
        let error = TaskForgeError::dependency_not_satisfied("child", "parent");
        let suggestions = suggestions_for(&error);
        assert!(
            suggestions
                .iter()
                .any(|s| s.category == SuggestionCategory::Dependency)
        );
    }
}
