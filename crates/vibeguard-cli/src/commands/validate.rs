// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! `vibeguard validate` - exercise load and validation only.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use vibeguard::{EXIT_CONFIG_ERROR, EXIT_OK};

use crate::helpers::load_config;
use crate::output::{print_error, print_success};

/// Load and validate the configuration, then exit
#[derive(Args)]
pub struct ValidateArgs {}

pub async fn run(_args: ValidateArgs, config_path: Option<&Path>) -> Result<i32> {
    match load_config(config_path) {
        Ok(config) => {
            print_success(&format!(
                "configuration OK ({} checks, {} prompts, {} levels)",
                config.checks.len(),
                config.prompts.len(),
                config.levels().len()
            ));
            Ok(EXIT_OK)
        }
        Err(e) => {
            print_error(&e.to_string());
            Ok(EXIT_CONFIG_ERROR)
        }
    }
}
