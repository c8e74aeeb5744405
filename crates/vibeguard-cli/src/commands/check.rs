// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! `vibeguard check` - run the configured checks and report results.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use vibeguard::{Scheduler, SchedulerOptions, EXIT_CONFIG_ERROR};

use crate::helpers::load_config;
use crate::output::{print_error, render_summary};

/// Run all checks, or only the named check
#[derive(Args)]
pub struct CheckArgs {
    /// Run exactly this check id; its `requires` chain is not run
    pub id: Option<String>,

    /// Maximum number of checks running concurrently (positive)
    #[arg(long, value_name = "N", default_value_t = vibeguard::DEFAULT_PARALLELISM)]
    pub parallel: usize,

    /// Cancel remaining work after the first error-severity failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Emit the machine-readable JSON report instead of text
    #[arg(long)]
    pub json: bool,

    /// Include passed checks in the text report
    #[arg(long)]
    pub verbose: bool,

    /// Directory for per-check log files
    #[arg(long, value_name = "PATH", default_value = vibeguard::schedule::DEFAULT_LOG_DIR)]
    pub log_dir: std::path::PathBuf,

    /// Write log files for passed checks too
    #[arg(long)]
    pub log_all: bool,

    /// Run only checks carrying this tag
    #[arg(long, value_name = "TAG", conflicts_with = "id")]
    pub tag: Option<String>,
}

pub async fn run(args: CheckArgs, config_path: Option<&Path>) -> Result<i32> {
    if args.parallel == 0 {
        print_error("--parallel must be positive");
        return Ok(EXIT_CONFIG_ERROR);
    }

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            print_error(&e.to_string());
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let scheduler = Scheduler::new(
        Arc::new(config),
        SchedulerOptions {
            parallelism: args.parallel,
            fail_fast: args.fail_fast,
            log_dir: args.log_dir.clone(),
            log_all: args.log_all,
        },
    );

    // Ctrl-C cancels in-flight checks cooperatively; affected results report
    // Cancelled instead of the process dying mid-write.
    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let summary = match (&args.id, &args.tag) {
        (Some(id), _) => match scheduler.run_single(id).await {
            Some(summary) => summary,
            None => {
                print_error(&format!("unknown check '{id}'"));
                return Ok(EXIT_CONFIG_ERROR);
            }
        },
        (None, Some(tag)) => scheduler.run_tagged(tag).await,
        (None, None) => scheduler.run().await,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        render_summary(&summary, args.verbose);
    }
    Ok(summary.exit_code)
}
