// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! # VibeGuard
//!
//! Declarative policy enforcement for CI pipelines, pre-commit hooks, and
//! agent loops. A YAML configuration describes *checks* - shell commands
//! with optional structured extraction, assertions, and metadata - and the
//! engine:
//!
//! - plans an execution order that respects inter-check dependencies
//!   (cycle detection included);
//! - runs commands in bounded parallelism with per-check timeouts and
//!   fail-fast semantics;
//! - extracts structured data from command output using grok patterns;
//! - evaluates boolean assertions over the extracted values;
//! - reports results as text, JSON, and per-check log artifacts with a
//!   well-defined exit-code taxonomy.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vibeguard::config::loader;
//! use vibeguard::schedule::{Scheduler, SchedulerOptions};
//!
//! # async fn example() -> Result<(), vibeguard::ConfigError> {
//! let config = loader::load_str(r#"
//! version: "1"
//! checks:
//!   - id: coverage
//!     run: make coverage
//!     grok: "coverage: %{NUMBER:cov}%"
//!     assert: "cov >= 80"
//! "#)?;
//!
//! let scheduler = Scheduler::new(Arc::new(config), SchedulerOptions::default());
//! let summary = scheduler.run().await;
//! println!("exit code: {}", summary.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod exec;
pub mod expr;
pub mod grok;
pub mod report;
pub mod schedule;

pub use config::{
    Check, Config, ConfigError, EventHandler, EventValue, Prompt, Severity, DEFAULT_CHECK_TIMEOUT,
};
pub use exec::{CommandOutput, CANCELLED_EXIT_CODE, TIMEOUT_EXIT_CODE};
pub use expr::EvalError;
pub use grok::{ExtractError, ExtractedMap};
pub use report::{
    AssertionOutcome, CheckResult, CheckStatus, EventKind, PromptSource, ReportSummary,
    TriggeredPrompt, EXIT_CONFIG_ERROR, EXIT_OK, EXIT_TIMEOUT, EXIT_VIOLATIONS,
};
pub use schedule::{Scheduler, SchedulerOptions, DEFAULT_PARALLELISM};

/// Re-exported so embedders can tie the scheduler's cancellation to their
/// own shutdown signal without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
