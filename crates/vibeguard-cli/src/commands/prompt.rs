// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! `vibeguard prompt` - list prompts or print one prompt's content verbatim,
//! suitable for piping into external LLM tooling.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use vibeguard::{Config, ConfigError, EXIT_CONFIG_ERROR, EXIT_OK};

use crate::helpers::load_config;
use crate::output::{create_table, print_error, print_warning};

/// Built-in prompt served when no configuration exists yet, or when the
/// requested id is not defined. Intended to be piped to an LLM that writes
/// the first configuration for a project.
const INIT_PROMPT: &str = r#"Create a vibeguard.yaml policy configuration for this repository.

Inspect the project (build system, language, test tooling) and define a
small set of checks that catch real regressions. The schema:

version: "1"
vars:
  min_coverage: "80"
checks:
  - id: build
    run: make build
  - id: test
    run: make test
    requires: [build]
  - id: coverage
    run: make coverage
    requires: [test]
    grok: "coverage:\s+%{NUMBER:cov}%"
    assert: "cov >= {{.min_coverage}}"
    suggestion: "coverage is {{.cov}}%, below {{.min_coverage}}%"

Rules:
- every check needs a unique id and a shell command under `run`
- order dependent checks with `requires`; the engine runs independent
  checks in parallel
- use `grok` named captures plus `assert` to gate on values printed by
  the command; otherwise a non-zero exit fails the check
- `severity: warning` reports a problem without failing the run
- keep commands fast and deterministic; set `timeout` for anything slow

Output only the YAML document."#;

/// List prompts, or print one prompt's content verbatim
#[derive(Args)]
pub struct PromptArgs {
    /// Prompt id to print; omit to list all prompts
    pub id: Option<String>,
}

pub async fn run(args: PromptArgs, config_path: Option<&Path>) -> Result<i32> {
    let loaded = load_config(config_path);

    match (args.id, loaded) {
        (Some(id), Ok(config)) => {
            match config.prompt(&id) {
                Some(prompt) => println!("{}", prompt.content),
                // Unknown id falls back to the built-in scaffolding prompt.
                None => println!("{INIT_PROMPT}"),
            }
            Ok(EXIT_OK)
        }
        (Some(_), Err(ConfigError::NotFound(_))) => {
            println!("{INIT_PROMPT}");
            Ok(EXIT_OK)
        }
        (None, Ok(config)) => {
            print_listing(&config);
            Ok(EXIT_OK)
        }
        (None, Err(ConfigError::NotFound(_))) => {
            print_warning("no configuration found; only the built-in prompt is available");
            let mut table = create_table();
            table.set_header(["ID", "DESCRIPTION", "TAGS"]);
            table.add_row(["init", "built-in configuration scaffolding prompt", ""]);
            println!("{table}");
            Ok(EXIT_OK)
        }
        (_, Err(e)) => {
            print_error(&e.to_string());
            Ok(EXIT_CONFIG_ERROR)
        }
    }
}

fn print_listing(config: &Config) {
    let mut table = create_table();
    table.set_header(["ID", "DESCRIPTION", "TAGS"]);
    for prompt in &config.prompts {
        table.add_row([
            prompt.id.clone(),
            prompt.description.clone().unwrap_or_default(),
            prompt.tags.join(", "),
        ]);
    }
    if config.prompt("init").is_none() {
        table.add_row([
            "init".to_string(),
            "built-in configuration scaffolding prompt".to_string(),
            String::new(),
        ]);
    }
    println!("{table}");
}
