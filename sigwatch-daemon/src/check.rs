//! Offline rule file validation (`--check-rules`).

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use sigwatch_rules::compile_file;

/// Result of compiling a rule file without starting the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCheckReport {
    /// Rule file that was checked.
    pub path: String,
    /// Lines compiled into rules.
    pub accepted: usize,
    /// Lines skipped because they failed to parse.
    pub rejected: usize,
}

/// Compile `path` and report accepted/rejected counts.
///
/// # Errors
///
/// Duplicate ids and load failures (missing file, size limits) are errors;
/// individual unparsable lines are only counted.
pub async fn check_rules(path: &Path) -> Result<RuleCheckReport> {
    let set = compile_file(path)
        .await
        .map_err(|e| anyhow::anyhow!("rule check failed: {}", e))?;

    Ok(RuleCheckReport {
        path: path.display().to_string(),
        accepted: set.len(),
        rejected: set.load_error_count(),
    })
}
