// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! The reporter contract: per-check result records, the aggregated report,
//! the severity-to-exit-code policy, and the per-check log artifact.
//!
//! Renderers (human text, machine JSON) consume [`ReportSummary`] without
//! ever looking back at the source configuration. Exit codes follow a fixed
//! precedence: configuration errors (2) beat timeouts (4) beat violations
//! (3) beat success (0), and exactly one code is emitted per run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Severity;
use crate::grok::ExtractedMap;

/// No error-severity violations.
pub const EXIT_OK: i32 = 0;
/// Configuration error (load, parse, or validate).
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// One or more error-severity checks failed.
pub const EXIT_VIOLATIONS: i32 = 3;
/// At least one error-severity check timed out; timeouts win when present.
pub const EXIT_TIMEOUT: i32 = 4;

/// Terminal state of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Timedout,
    Cancelled,
    Skipped,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Timedout => "timedout",
            CheckStatus::Cancelled => "cancelled",
            CheckStatus::Skipped => "skipped",
        };
        write!(f, "{label}")
    }
}

/// Tri-state assertion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionOutcome {
    NotEvaluated,
    True,
    False,
}

/// Which event slot fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
    Timeout,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Timeout => "timeout",
        };
        write!(f, "{label}")
    }
}

/// Whether a triggered prompt came from a registered prompt or inline text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    Id,
    Inline,
}

/// One resolved event emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredPrompt {
    pub event: EventKind,
    pub source: PromptSource,
    /// Prompt body for references, literal text for inline values.
    pub content: String,
}

/// The record produced for every check, in configuration order. Serializes
/// to the machine report entry; stdout/stderr stay in memory for log
/// artifacts and are not part of the JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(rename = "id")]
    pub check_id: String,
    pub status: CheckStatus,
    /// OS exit status, −1 for cancelled, the timeout sentinel for timed out.
    pub exit_code: i32,
    #[serde(skip)]
    pub stdout: String,
    #[serde(skip)]
    pub stderr: String,
    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,
    pub severity: Severity,
    pub extracted: ExtractedMap,
    pub assertion_result: AssertionOutcome,
    /// Rendered suggestion template, when the check has one and did not pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Rendered fix template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    /// Path of the per-check log artifact, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub triggered_prompts: Vec<TriggeredPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Machine-readable extraction/assertion error payload, when one
    /// promoted this result to Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CheckResult {
    /// A skeleton result for checks that never ran (skipped or cancelled
    /// before start).
    pub(crate) fn unstarted(
        check_id: impl Into<String>,
        severity: Severity,
        status: CheckStatus,
        skip_reason: Option<String>,
    ) -> Self {
        let exit_code = match status {
            CheckStatus::Cancelled => crate::exec::CANCELLED_EXIT_CODE,
            _ => 0,
        };
        Self {
            check_id: check_id.into(),
            status,
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            severity,
            extracted: ExtractedMap::new(),
            assertion_result: AssertionOutcome::NotEvaluated,
            suggestion: None,
            fix: None,
            log_file: None,
            triggered_prompts: Vec::new(),
            skip_reason,
            failure: None,
        }
    }

    /// True when this result counts as a violation: error severity and a
    /// Failed or Timedout status.
    pub fn is_violation(&self) -> bool {
        self.severity == Severity::Error
            && matches!(self.status, CheckStatus::Failed | CheckStatus::Timedout)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Aggregated report handed to renderers and the process exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// All results, in the order checks appear in the configuration.
    pub checks: Vec<CheckResult>,
    /// Ids of error-severity Failed/Timedout results, in configuration order.
    pub violations: Vec<String>,
    pub fail_fast_triggered: bool,
    pub exit_code: i32,
}

impl ReportSummary {
    /// Build the summary from finished results, computing violations and the
    /// exit code.
    pub fn new(checks: Vec<CheckResult>, fail_fast_triggered: bool) -> Self {
        let violations = checks
            .iter()
            .filter(|r| r.is_violation())
            .map(|r| r.check_id.clone())
            .collect();
        let exit_code = compute_exit_code(&checks);
        Self {
            checks,
            violations,
            fail_fast_triggered,
            exit_code,
        }
    }

    /// Count of results with the given status.
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|r| r.status == status).count()
    }
}

/// Exit-code policy over finished results. Precedence: timeouts (4) beat
/// failed violations (3) beat success (0). Configuration errors (2) are
/// raised before any result exists and take precedence upstream.
pub fn compute_exit_code(checks: &[CheckResult]) -> i32 {
    let mut any_failed = false;
    for result in checks.iter().filter(|r| r.is_violation()) {
        match result.status {
            CheckStatus::Timedout => return EXIT_TIMEOUT,
            _ => any_failed = true,
        }
    }
    if any_failed {
        EXIT_VIOLATIONS
    } else {
        EXIT_OK
    }
}

/// Write the per-check log artifact: `<log-dir>/<check-id>.log`, overwritten
/// on every run so it always reflects the latest execution. Human-readable;
/// never parsed back by the tool.
pub async fn write_check_log(
    log_dir: &Path,
    result: &CheckResult,
    command: &str,
    assertion: Option<&str>,
) -> std::io::Result<PathBuf> {
    use chrono::{SecondsFormat, Utc};

    let mut body = String::new();
    body.push_str(&format!("check: {}\n", result.check_id));
    body.push_str(&format!(
        "time: {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    body.push_str(&format!("command: {command}\n"));
    body.push_str(&format!("status: {}\n", result.status));
    body.push_str(&format!("exit code: {}\n", result.exit_code));
    body.push_str(&format!("duration: {}ms\n", result.duration.as_millis()));
    if let Some(reason) = &result.skip_reason {
        body.push_str(&format!("skip reason: {reason}\n"));
    }
    if let Some(failure) = &result.failure {
        body.push_str(&format!("error: {failure}\n"));
    }
    body.push_str("--- stdout ---\n");
    body.push_str(&result.stdout);
    if !result.stdout.ends_with('\n') {
        body.push('\n');
    }
    body.push_str("--- stderr ---\n");
    body.push_str(&result.stderr);
    if !result.stderr.ends_with('\n') {
        body.push('\n');
    }
    if !result.extracted.is_empty() {
        body.push_str("--- extracted ---\n");
        for (key, value) in &result.extracted {
            body.push_str(&format!("{key} = {value}\n"));
        }
    }
    if let Some(assertion) = assertion {
        let outcome = match result.assertion_result {
            AssertionOutcome::True => "true",
            AssertionOutcome::False => "false",
            AssertionOutcome::NotEvaluated => "not evaluated",
        };
        body.push_str(&format!("--- assertion ---\n{assertion} => {outcome}\n"));
    }

    tokio::fs::create_dir_all(log_dir).await?;
    let path = log_dir.join(format!("{}.log", result.check_id));
    tokio::fs::write(&path, body).await?;
    Ok(path)
}
