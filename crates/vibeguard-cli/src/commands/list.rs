// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! `vibeguard list` - show configured checks with dependency information.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use vibeguard::{Config, EXIT_CONFIG_ERROR, EXIT_OK};

use crate::helpers::load_config;
use crate::output::{create_table, print_error};

/// List configured checks with dependency information
#[derive(Args)]
pub struct ListArgs {
    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListArgs, config_path: Option<&Path>) -> Result<i32> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            print_error(&e.to_string());
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json_listing(&config))?);
    } else {
        print_table(&config);
    }
    Ok(EXIT_OK)
}

fn json_listing(config: &Config) -> serde_json::Value {
    let checks: Vec<serde_json::Value> = config
        .checks
        .iter()
        .map(|check| {
            serde_json::json!({
                "id": check.id,
                "severity": check.severity,
                "level": config.level_of(&check.id),
                "requires": check.requires,
                "tags": check.tags,
                "timeout_ms": check.timeout.as_millis() as u64,
                "has_assertion": check.assert_expr.is_some(),
            })
        })
        .collect();
    serde_json::json!({ "checks": checks })
}

fn print_table(config: &Config) {
    let mut table = create_table();
    table.set_header(["ID", "SEVERITY", "LEVEL", "REQUIRES", "TAGS", "TIMEOUT"]);
    for check in &config.checks {
        table.add_row([
            check.id.clone(),
            check.severity.to_string(),
            config
                .level_of(&check.id)
                .map_or_else(String::new, |l| l.to_string()),
            check.requires.join(", "),
            check.tags.join(", "),
            crate::output::format_duration(check.timeout),
        ]);
    }
    println!("{table}");
}
