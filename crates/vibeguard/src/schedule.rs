// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Level-based parallel scheduling of checks.
//!
//! The scheduler walks the validator's execution levels in order. Within a
//! level, workers run concurrently under a semaphore of capacity P; a later
//! level's first check starts strictly after every earlier-level check has
//! terminated. Checks whose error-severity dependencies did not pass are
//! skipped; with fail-fast enabled, the first error-severity failure or
//! timeout broadcasts the shared cancellation token and every subsequent
//! level is skipped wholesale.
//!
//! Workers share nothing mutable: each produces one [`CheckResult`], and the
//! coordinator assembles them into configuration order regardless of finish
//! order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{interpolate, Check, Config};
use crate::events;
use crate::exec;
use crate::expr;
use crate::grok::{self, ExtractedMap};
use crate::report::{self, AssertionOutcome, CheckResult, CheckStatus, ReportSummary};

/// Default worker-pool capacity.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Default directory for per-check log artifacts.
pub const DEFAULT_LOG_DIR: &str = ".vibeguard/log";

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrently running checks.
    pub parallelism: usize,
    /// Cancel remaining work after the first error-severity failure.
    pub fail_fast: bool,
    /// Directory for `<check-id>.log` artifacts.
    pub log_dir: PathBuf,
    /// Write log artifacts for passed checks too.
    pub log_all: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            fail_fast: false,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_all: false,
        }
    }
}

/// Drives a validated configuration to completion.
pub struct Scheduler {
    config: Arc<Config>,
    options: SchedulerOptions,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, options: SchedulerOptions) -> Self {
        Self {
            config,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// The shared cancellation token. Cancelling it (Ctrl-C, embedding
    /// shutdown) aborts in-flight subprocesses; affected checks report
    /// Cancelled, never Timedout.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every check, level by level.
    pub async fn run(&self) -> ReportSummary {
        self.run_selected(None).await
    }

    /// Run only the checks carrying `tag`. Dependency semantics are
    /// unchanged; a selected check whose requirement was filtered out is
    /// skipped.
    pub async fn run_tagged(&self, tag: &str) -> ReportSummary {
        self.run_selected(Some(tag)).await
    }

    /// Run exactly one check by id, ignoring the rest of the plan. A check
    /// with a non-empty `requires` list is reported Skipped; callers who
    /// want the chain run the full set. Returns `None` for an unknown id.
    pub async fn run_single(&self, id: &str) -> Option<ReportSummary> {
        let check = self.config.check(id)?;
        let result = if !check.requires.is_empty() {
            CheckResult::unstarted(
                id,
                check.severity,
                CheckStatus::Skipped,
                Some(format!(
                    "required dependencies not executed in single-check mode: {}",
                    check.requires.join(", ")
                )),
            )
        } else if self.cancel.is_cancelled() {
            CheckResult::unstarted(id, check.severity, CheckStatus::Cancelled, None)
        } else {
            execute_check(
                &self.config,
                check,
                &self.cancel,
                &self.options.log_dir,
                self.options.log_all,
            )
            .await
        };
        Some(ReportSummary::new(vec![result], false))
    }

    async fn run_selected(&self, tag: Option<&str>) -> ReportSummary {
        let config = &self.config;
        let selected: HashSet<&str> = config
            .checks
            .iter()
            .filter(|c| tag.map_or(true, |t| c.has_tag(t)))
            .map(|c| c.id.as_str())
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.options.parallelism.max(1)));
        let mut results: HashMap<String, CheckResult> = HashMap::new();
        let mut fail_fast_triggered = false;

        for (level_index, level) in config.levels().iter().enumerate() {
            let mut runnable: Vec<usize> = Vec::new();
            for id in level {
                if !selected.contains(id.as_str()) {
                    continue;
                }
                let Some(index) = config.check_position(id) else {
                    continue;
                };
                let check = &config.checks[index];
                match find_blocking_dependency(check, &selected, &results) {
                    Some(reason) => {
                        tracing::debug!(check = %check.id, %reason, "skipping check");
                        results.insert(
                            check.id.clone(),
                            CheckResult::unstarted(
                                &check.id,
                                check.severity,
                                CheckStatus::Skipped,
                                Some(reason),
                            ),
                        );
                    }
                    None => runnable.push(index),
                }
            }

            let mut handles = Vec::with_capacity(runnable.len());
            for index in runnable {
                let config = Arc::clone(&self.config);
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                let log_dir = self.options.log_dir.clone();
                let log_all = self.options.log_all;
                handles.push((
                    index,
                    tokio::spawn(async move {
                        run_worker(config, index, semaphore, cancel, log_dir, log_all).await
                    }),
                ));
            }

            for (index, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        let check = &config.checks[index];
                        let mut result = CheckResult::unstarted(
                            &check.id,
                            check.severity,
                            CheckStatus::Failed,
                            None,
                        );
                        result.failure = Some(format!("worker failed: {join_error}"));
                        result
                    }
                };
                results.insert(result.check_id.clone(), result);
            }

            if self.options.fail_fast {
                let offender = level
                    .iter()
                    .filter_map(|id| results.get(id.as_str()))
                    .find(|r| r.is_violation());
                if let Some(offender) = offender {
                    let source = offender.check_id.clone();
                    tracing::warn!(check = %source, "fail-fast triggered, cancelling remaining work");
                    fail_fast_triggered = true;
                    self.cancel.cancel();
                    let reason = format!("fail-fast triggered by check '{source}'");
                    for later_level in &config.levels()[level_index + 1..] {
                        for id in later_level {
                            if !selected.contains(id.as_str()) {
                                continue;
                            }
                            if let Some(check) = config.check(id) {
                                results.insert(
                                    check.id.clone(),
                                    CheckResult::unstarted(
                                        &check.id,
                                        check.severity,
                                        CheckStatus::Skipped,
                                        Some(reason.clone()),
                                    ),
                                );
                            }
                        }
                    }
                    break;
                }
            }
        }

        let ordered = config
            .checks
            .iter()
            .filter_map(|c| results.remove(&c.id))
            .collect();
        ReportSummary::new(ordered, fail_fast_triggered)
    }
}

/// A dependency blocks its dependent unless it passed, or it failed/timed
/// out at warning severity (warnings never block).
fn find_blocking_dependency(
    check: &Check,
    selected: &HashSet<&str>,
    results: &HashMap<String, CheckResult>,
) -> Option<String> {
    for dep in &check.requires {
        if !selected.contains(dep.as_str()) {
            return Some(format!("required dependency '{dep}' was not selected"));
        }
        let satisfied = results.get(dep.as_str()).is_some_and(|r| {
            r.status == CheckStatus::Passed
                || (matches!(r.status, CheckStatus::Failed | CheckStatus::Timedout)
                    && r.severity == crate::config::Severity::Warning)
        });
        if !satisfied {
            return Some(format!("required dependency '{dep}' failed"));
        }
    }
    None
}

async fn run_worker(
    config: Arc<Config>,
    index: usize,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    log_dir: PathBuf,
    log_all: bool,
) -> CheckResult {
    let check = &config.checks[index];
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return CheckResult::unstarted(&check.id, check.severity, CheckStatus::Cancelled, None)
        }
    };
    if cancel.is_cancelled() {
        return CheckResult::unstarted(&check.id, check.severity, CheckStatus::Cancelled, None);
    }
    execute_check(&config, check, &cancel, &log_dir, log_all).await
}

/// Run one check end to end: subprocess, extraction, assertion, status
/// classification, event dispatch, log artifact.
async fn execute_check(
    config: &Config,
    check: &Check,
    cancel: &CancellationToken,
    log_dir: &Path,
    log_all: bool,
) -> CheckResult {
    tracing::debug!(check = %check.id, "starting check");

    let output = match exec::run_shell(&check.run, check.timeout, cancel).await {
        Ok(output) => output,
        Err(spawn_error) => {
            let message = format!("failed to spawn command: {spawn_error}");
            let mut result =
                CheckResult::unstarted(&check.id, check.severity, CheckStatus::Failed, None);
            result.exit_code = exec::SPAWN_FAILURE_EXIT_CODE;
            result.stderr = message.clone();
            result.failure = Some(annotate(check, &message));
            result.triggered_prompts = events::dispatch(config, check, CheckStatus::Failed);
            write_log(log_dir, &mut result, check, log_all).await;
            return result;
        }
    };

    let mut failure: Option<String> = None;
    let mut extracted = ExtractedMap::new();

    let extractor_input: Option<Result<Vec<u8>, String>> = match &check.file {
        Some(path) => Some(tokio::fs::read(path).await.map_err(|e| {
            format!("failed to read extractor input {}: {e}", path.display())
        })),
        None if !check.grok.is_empty() => Some(Ok(output.combined.clone().into_bytes())),
        None => None,
    };
    match extractor_input {
        Some(Err(message)) => failure = Some(annotate(check, &message)),
        Some(Ok(bytes)) if !check.grok.is_empty() => {
            match grok::extract(&check.grok, &bytes) {
                Ok(map) => extracted = map,
                Err(e) => failure = Some(annotate(check, &e.to_string())),
            }
        }
        _ => {}
    }

    let assertion_result = match &check.assert_expr {
        None => AssertionOutcome::NotEvaluated,
        Some(_) if failure.is_some() => AssertionOutcome::NotEvaluated,
        Some(expression) => match expr::evaluate(expression, &extracted) {
            Ok(true) => AssertionOutcome::True,
            Ok(false) => AssertionOutcome::False,
            Err(e) => {
                failure = Some(annotate(check, &e.to_string()));
                AssertionOutcome::NotEvaluated
            }
        },
    };

    let status = if output.timed_out {
        CheckStatus::Timedout
    } else if output.cancelled {
        CheckStatus::Cancelled
    } else if failure.is_some()
        || assertion_result == AssertionOutcome::False
        || (check.assert_expr.is_none() && output.exit_code != 0)
    {
        CheckStatus::Failed
    } else {
        CheckStatus::Passed
    };

    let merged = interpolate::merged_values(&config.vars, &extracted);
    let suggestion = check
        .suggestion
        .as_ref()
        .map(|t| interpolate::render_template(t, &merged));
    let fix = check
        .fix
        .as_ref()
        .map(|t| interpolate::render_template(t, &merged));

    let triggered_prompts = events::dispatch(config, check, status);

    let mut result = CheckResult {
        check_id: check.id.clone(),
        status,
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        duration: output.duration,
        severity: check.severity,
        extracted,
        assertion_result,
        suggestion,
        fix,
        log_file: None,
        triggered_prompts,
        skip_reason: None,
        failure,
    };

    write_log(log_dir, &mut result, check, log_all).await;
    tracing::debug!(
        check = %check.id,
        status = %result.status,
        exit_code = result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "check finished"
    );
    result
}

/// Log I/O failures are non-fatal: reported on stderr, the result is
/// unchanged.
async fn write_log(log_dir: &Path, result: &mut CheckResult, check: &Check, log_all: bool) {
    if result.status == CheckStatus::Passed && !log_all {
        return;
    }
    match report::write_check_log(log_dir, result, &check.run, check.assert_expr.as_deref()).await {
        Ok(path) => result.log_file = Some(path),
        Err(e) => {
            tracing::warn!(check = %check.id, error = %e, "failed to write check log");
            eprintln!(
                "warning: failed to write log for check '{}': {e}",
                check.id
            );
        }
    }
}

fn annotate(check: &Check, message: &str) -> String {
    match check.line {
        Some(line) => format!("check '{}' (line {line}): {message}", check.id),
        None => format!("check '{}': {message}", check.id),
    }
}
