//! End-to-end scheduler tests against real subprocesses.
//!
//! Each test loads a small YAML configuration, drives the scheduler, and
//! asserts on the aggregated report: statuses, skip reasons, extracted
//! values, triggered prompts, exit codes, and log artifacts.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vibeguard::config::loader;
use vibeguard::{
    AssertionOutcome, CheckStatus, Config, PromptSource, ReportSummary, Scheduler,
    SchedulerOptions, EXIT_OK, EXIT_TIMEOUT, EXIT_VIOLATIONS, TIMEOUT_EXIT_CODE,
};

fn scheduler(config: Config, log_dir: &Path, parallelism: usize, fail_fast: bool) -> Scheduler {
    Scheduler::new(
        Arc::new(config),
        SchedulerOptions {
            parallelism,
            fail_fast,
            log_dir: log_dir.to_path_buf(),
            log_all: false,
        },
    )
}

async fn run(yaml: &str, log_dir: &Path, parallelism: usize, fail_fast: bool) -> ReportSummary {
    let config = loader::load_str(yaml).unwrap();
    scheduler(config, log_dir, parallelism, fail_fast).run().await
}

fn status_of(summary: &ReportSummary, id: &str) -> CheckStatus {
    summary
        .checks
        .iter()
        .find(|r| r.check_id == id)
        .unwrap_or_else(|| panic!("no result for {id}"))
        .status
}

// ==================== SCENARIOS ====================

#[tokio::test]
async fn diamond_runs_levels_in_order_with_parallelism_two() {
    let dir = tempfile::tempdir().unwrap();
    let order = dir.path().join("order.txt");
    let yaml = format!(
        r#"
version: "1"
checks:
  - id: a
    run: "echo a >> {order}"
  - id: b
    run: "echo b >> {order}"
    requires: [a]
  - id: c
    run: "echo c >> {order}"
    requires: [a]
  - id: d
    run: "echo d >> {order}"
    requires: [b, c]
"#,
        order = order.display()
    );

    let summary = run(&yaml, dir.path(), 2, false).await;
    assert_eq!(summary.exit_code, EXIT_OK);
    for id in ["a", "b", "c", "d"] {
        assert_eq!(status_of(&summary, id), CheckStatus::Passed);
    }

    // Results are reported in configuration order, not finish order.
    let ids: Vec<&str> = summary.checks.iter().map(|r| r.check_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c", "d"]);

    // Level boundaries are real: a ran before b and c, d ran last.
    let observed = std::fs::read_to_string(&order).unwrap();
    let lines: Vec<&str> = observed.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "a");
    assert_eq!(lines[3], "d");
}

#[tokio::test]
async fn fail_fast_blocks_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: a
    run: exit 0
  - id: b
    run: exit 1
  - id: c
    run: exit 0
    requires: [b]
"#;

    let summary = run(yaml, dir.path(), 4, true).await;
    assert_eq!(status_of(&summary, "a"), CheckStatus::Passed);
    assert_eq!(status_of(&summary, "b"), CheckStatus::Failed);
    assert_eq!(status_of(&summary, "c"), CheckStatus::Skipped);
    let skipped = summary.checks.iter().find(|r| r.check_id == "c").unwrap();
    assert!(skipped.skip_reason.as_ref().unwrap().contains("b"));
    assert!(summary.fail_fast_triggered);
    assert_eq!(summary.violations, vec!["b".to_string()]);
    assert_eq!(summary.exit_code, EXIT_VIOLATIONS);
}

#[tokio::test]
async fn timeout_wins_exit_code_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: a
    run: exit 1
  - id: b
    run: sleep 10
    timeout: 200ms
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "a"), CheckStatus::Failed);
    assert_eq!(status_of(&summary, "b"), CheckStatus::Timedout);
    let timed_out = summary.checks.iter().find(|r| r.check_id == "b").unwrap();
    assert_eq!(timed_out.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(summary.exit_code, EXIT_TIMEOUT);
}

#[tokio::test]
async fn grok_extraction_feeds_assertion() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: coverage
    run: "echo 'coverage: 83.0%'"
    grok: "coverage:\\s+%{NUMBER:cov}%"
    assert: "cov >= 80"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Passed);
    assert_eq!(result.extracted.get("cov").map(String::as_str), Some("83.0"));
    assert_eq!(result.assertion_result, AssertionOutcome::True);
    assert_eq!(summary.exit_code, EXIT_OK);
}

#[tokio::test]
async fn event_dispatch_distinguishes_references_from_inline() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
prompts:
  - id: init
    content: scaffold a starter configuration
checks:
  - id: x
    run: exit 1
    on:
      failure: [init]
  - id: y
    run: exit 1
    on:
      failure: init
"#;

    let summary = run(yaml, dir.path(), 4, false).await;

    let x = summary.checks.iter().find(|r| r.check_id == "x").unwrap();
    assert_eq!(x.triggered_prompts.len(), 1);
    assert_eq!(x.triggered_prompts[0].source, PromptSource::Id);
    assert_eq!(
        x.triggered_prompts[0].content,
        "scaffold a starter configuration"
    );

    let y = summary.checks.iter().find(|r| r.check_id == "y").unwrap();
    assert_eq!(y.triggered_prompts.len(), 1);
    assert_eq!(y.triggered_prompts[0].source, PromptSource::Inline);
    assert_eq!(y.triggered_prompts[0].content, "init");
}

// ==================== DEPENDENCY SEMANTICS ====================

#[tokio::test]
async fn failed_error_dependency_skips_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: a
    run: exit 1
  - id: b
    run: exit 0
    requires: [a]
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "b"), CheckStatus::Skipped);
    let b = summary.checks.iter().find(|r| r.check_id == "b").unwrap();
    assert!(b.skip_reason.as_ref().unwrap().contains("'a'"));
    assert_eq!(summary.exit_code, EXIT_VIOLATIONS);
}

#[tokio::test]
async fn warning_failure_does_not_block_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: advisory
    run: exit 1
    severity: warning
  - id: gated
    run: exit 0
    requires: [advisory]
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "advisory"), CheckStatus::Failed);
    assert_eq!(status_of(&summary, "gated"), CheckStatus::Passed);
    assert!(summary.violations.is_empty());
    assert_eq!(summary.exit_code, EXIT_OK);
}

#[tokio::test]
async fn skipped_dependency_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: a
    run: exit 1
  - id: b
    run: exit 0
    requires: [a]
  - id: c
    run: exit 0
    requires: [b]
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "b"), CheckStatus::Skipped);
    assert_eq!(status_of(&summary, "c"), CheckStatus::Skipped);
}

// ==================== ASSERTION AND EXTRACTION EDGES ====================

#[tokio::test]
async fn passing_assertion_overrides_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: coverage
    run: "echo 'coverage: 83.0%'; exit 1"
    grok: "coverage:\\s+%{NUMBER:cov}%"
    assert: "cov >= 80"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "coverage"), CheckStatus::Passed);
    assert_eq!(summary.checks[0].exit_code, 1);
}

#[tokio::test]
async fn failing_assertion_fails_check() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: coverage
    run: "echo 'coverage: 71.5%'"
    grok: "coverage:\\s+%{NUMBER:cov}%"
    assert: "cov >= 80"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Failed);
    assert_eq!(result.assertion_result, AssertionOutcome::False);
    assert_eq!(summary.exit_code, EXIT_VIOLATIONS);
}

#[tokio::test]
async fn extractor_reads_stderr_through_combined_output() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: warnings
    run: "echo 'warnings: 3' >&2"
    grok: "warnings:\\s+%{INT:count}"
    assert: "count <= 5"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(status_of(&summary, "warnings"), CheckStatus::Passed);
}

#[tokio::test]
async fn file_input_replaces_command_output() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("coverage.txt");
    std::fs::write(&report, "coverage: 91.2%\n").unwrap();
    let yaml = format!(
        r#"
version: "1"
checks:
  - id: coverage
    run: "echo 'coverage: 10.0%'"
    file: {report}
    grok: "coverage:\\s+%{{NUMBER:cov}}%"
    assert: "cov >= 90"
"#,
        report = report.display()
    );

    let summary = run(&yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Passed);
    assert_eq!(result.extracted.get("cov").map(String::as_str), Some("91.2"));
}

#[tokio::test]
async fn missing_input_file_fails_check() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: coverage
    run: exit 0
    file: /nonexistent/coverage.txt
    grok: "%{NUMBER:cov}"
    assert: "cov >= 90"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Failed);
    assert!(result
        .failure
        .as_ref()
        .unwrap()
        .contains("failed to read extractor input"));
    assert_eq!(result.assertion_result, AssertionOutcome::NotEvaluated);
}

#[tokio::test]
async fn undefined_capture_in_assertion_fails_check() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: coverage
    run: "echo 'no numbers here'"
    grok: "coverage:\\s+%{NUMBER:cov}%"
    assert: "cov >= 80"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Failed);
    assert!(result
        .failure
        .as_ref()
        .unwrap()
        .contains("undefined capture cov"));
}

#[tokio::test]
async fn bad_grok_pattern_fails_only_that_check() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: broken
    run: "echo output"
    grok: "broken("
  - id: fine
    run: exit 0
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let broken = summary.checks.iter().find(|r| r.check_id == "broken").unwrap();
    assert_eq!(broken.status, CheckStatus::Failed);
    assert!(broken.failure.as_ref().unwrap().contains("grok pattern 0"));
    assert_eq!(status_of(&summary, "fine"), CheckStatus::Passed);
}

// ==================== TEMPLATES ====================

#[tokio::test]
async fn suggestion_renders_from_extracted_and_vars() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
vars:
  min: "80"
checks:
  - id: coverage
    run: "echo 'coverage: 71.5%'"
    grok: "coverage:\\s+%{NUMBER:cov}%"
    assert: "cov >= {{.min}}"
    suggestion: "coverage is {{.cov}}%, needs {{.min}}%"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Failed);
    assert_eq!(
        result.suggestion.as_deref(),
        Some("coverage is 71.5%, needs 80%")
    );
}

#[tokio::test]
async fn unrenderable_suggestion_is_returned_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: fmt
    run: exit 1
    suggestion: "run {{.missing}} to fix"
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    assert_eq!(
        summary.checks[0].suggestion.as_deref(),
        Some("run {{.missing}} to fix")
    );
}

// ==================== PARALLELISM AND CANCELLATION ====================

#[tokio::test]
async fn siblings_run_concurrently_under_the_bound() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: left
    run: sleep 0.5
  - id: right
    run: sleep 0.5
"#;

    let started = Instant::now();
    let summary = run(yaml, dir.path(), 2, false).await;
    let elapsed = started.elapsed();
    assert_eq!(summary.exit_code, EXIT_OK);
    // Serial execution would take at least a second.
    assert!(elapsed < Duration::from_millis(950), "took {elapsed:?}");
}

#[tokio::test]
async fn parallelism_one_degrades_to_serial() {
    let dir = tempfile::tempdir().unwrap();
    let order = dir.path().join("order.txt");
    let yaml = format!(
        r#"
version: "1"
checks:
  - id: first
    run: "echo first >> {order}"
  - id: second
    run: "echo second >> {order}"
  - id: third
    run: "echo third >> {order}"
    requires: [first, second]
"#,
        order = order.display()
    );

    let summary = run(&yaml, dir.path(), 1, false).await;
    assert_eq!(summary.exit_code, EXIT_OK);
    let observed = std::fs::read_to_string(&order).unwrap();
    assert_eq!(observed.lines().count(), 3);
    assert_eq!(observed.lines().last(), Some("third"));
}

#[tokio::test]
async fn external_cancellation_marks_checks_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: slow
    run: sleep 5
  - id: other
    run: sleep 5
"#;

    let config = loader::load_str(yaml).unwrap();
    let scheduler = scheduler(config, dir.path(), 4, false);
    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let summary = scheduler.run().await;
    assert!(started.elapsed() < Duration::from_secs(4));
    for result in &summary.checks {
        assert_eq!(result.status, CheckStatus::Cancelled);
        assert_eq!(result.exit_code, -1);
    }
    // Cancellations are not violations.
    assert_eq!(summary.exit_code, EXIT_OK);
}

// ==================== SINGLE-CHECK MODE AND TAGS ====================

#[tokio::test]
async fn single_check_mode_runs_exactly_one_check() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: a
    run: exit 0
  - id: b
    run: exit 0
    requires: [a]
"#;

    let config = loader::load_str(yaml).unwrap();
    let scheduler = scheduler(config, dir.path(), 4, false);

    let summary = scheduler.run_single("a").await.unwrap();
    assert_eq!(summary.checks.len(), 1);
    assert_eq!(summary.checks[0].status, CheckStatus::Passed);

    let summary = scheduler.run_single("b").await.unwrap();
    assert_eq!(summary.checks[0].status, CheckStatus::Skipped);
    assert!(summary.checks[0]
        .skip_reason
        .as_ref()
        .unwrap()
        .contains("single-check mode"));

    assert!(scheduler.run_single("ghost").await.is_none());
}

#[tokio::test]
async fn tag_filter_narrows_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: fast-lint
    run: exit 0
    tags: [fast]
  - id: slow-suite
    run: exit 1
  - id: gated
    run: exit 0
    tags: [fast]
    requires: [slow-suite]
"#;

    let config = loader::load_str(yaml).unwrap();
    let summary = scheduler(config, dir.path(), 4, false).run_tagged("fast").await;
    let ids: Vec<&str> = summary.checks.iter().map(|r| r.check_id.as_str()).collect();
    assert_eq!(ids, ["fast-lint", "gated"]);
    assert_eq!(status_of(&summary, "fast-lint"), CheckStatus::Passed);
    assert_eq!(status_of(&summary, "gated"), CheckStatus::Skipped);
    // The unselected failing check does not affect the exit code.
    assert_eq!(summary.exit_code, EXIT_OK);
}

// ==================== LOG ARTIFACTS ====================

#[tokio::test]
async fn failed_checks_write_log_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let yaml = r#"
version: "1"
checks:
  - id: bad
    run: "echo diagnostics; exit 3"
  - id: good
    run: exit 0
"#;

    let summary = run(yaml, &logs, 4, false).await;
    let bad = summary.checks.iter().find(|r| r.check_id == "bad").unwrap();
    let log_path = bad.log_file.as_ref().unwrap();
    assert_eq!(log_path, &logs.join("bad.log"));
    let body = std::fs::read_to_string(log_path).unwrap();
    assert!(body.contains("check: bad"));
    assert!(body.contains("exit code: 3"));
    assert!(body.contains("diagnostics"));

    let good = summary.checks.iter().find(|r| r.check_id == "good").unwrap();
    assert!(good.log_file.is_none());
    assert!(!logs.join("good.log").exists());
}

#[tokio::test]
async fn log_all_writes_artifacts_for_passed_checks() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let yaml = r#"
version: "1"
checks:
  - id: good
    run: exit 0
"#;

    let config = loader::load_str(yaml).unwrap();
    let scheduler = Scheduler::new(
        Arc::new(config),
        SchedulerOptions {
            parallelism: 4,
            fail_fast: false,
            log_dir: logs.clone(),
            log_all: true,
        },
    );
    let summary = scheduler.run().await;
    assert!(summary.checks[0].log_file.is_some());
    assert!(logs.join("good.log").exists());
}

// ==================== SPAWN FAILURES ====================

#[tokio::test]
async fn command_not_found_is_a_failure_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
version: "1"
checks:
  - id: ghost
    run: definitely_not_a_real_command_xyz
"#;

    let summary = run(yaml, dir.path(), 4, false).await;
    let result = &summary.checks[0];
    assert_eq!(result.status, CheckStatus::Failed);
    // `sh -c` reports the missing command on stderr with exit 127.
    assert_eq!(result.exit_code, 127);
    assert!(!result.stderr.is_empty());
    assert_eq!(summary.exit_code, EXIT_VIOLATIONS);
}
