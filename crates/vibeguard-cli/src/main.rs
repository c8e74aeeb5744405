// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
// Allow clippy warnings for CLI application
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod helpers;
mod output;

use commands::{check, list, prompt, validate};
use output::print_error;

/// VibeGuard CLI - declarative policy checks for CI, hooks, and agent loops
///
/// Commands:
///   check     run all checks (or one by id) and report results
///   list      show the configured checks with dependency information
///   validate  load and validate the configuration only
///   prompt    list prompts or print one prompt's content for piping
#[derive(Parser)]
#[command(name = "vibeguard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative policy enforcement - plan, run, and report checks", long_about = None)]
struct Cli {
    /// Path to the configuration file (overrides auto-discovery of
    /// vibeguard.yaml|yml and .vibeguard.yaml|yml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks, or only the named check
    Check(check::CheckArgs),

    /// List configured checks with dependency information
    List(list::ListArgs),

    /// Load and validate the configuration, then exit
    Validate(validate::ValidateArgs),

    /// List prompts, or print one prompt's content verbatim
    Prompt(prompt::PromptArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Check(args) => check::run(args, cli.config.as_deref()).await,
        Commands::List(args) => list::run(args, cli.config.as_deref()).await,
        Commands::Validate(args) => validate::run(args, cli.config.as_deref()).await,
        Commands::Prompt(args) => prompt::run(args, cli.config.as_deref()).await,
    };

    let code = outcome.unwrap_or_else(|e| {
        print_error(&format!("{e:#}"));
        vibeguard::EXIT_CONFIG_ERROR
    });
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_known_subcommands() {
        let cli = Cli::try_parse_from(["vibeguard", "check"]).expect("parse check");
        assert!(matches!(cli.command, Commands::Check(_)));

        let cli = Cli::try_parse_from(["vibeguard", "check", "build"]).expect("check with id");
        assert!(matches!(cli.command, Commands::Check(_)));

        let cli = Cli::try_parse_from(["vibeguard", "list", "--json"]).expect("list json");
        assert!(matches!(cli.command, Commands::List(_)));

        let cli = Cli::try_parse_from(["vibeguard", "validate"]).expect("validate");
        assert!(matches!(cli.command, Commands::Validate(_)));

        let cli = Cli::try_parse_from(["vibeguard", "prompt", "init"]).expect("prompt");
        assert!(matches!(cli.command, Commands::Prompt(_)));
    }

    #[test]
    fn clap_parses_check_flags() {
        let cli = Cli::try_parse_from([
            "vibeguard",
            "check",
            "--parallel",
            "8",
            "--fail-fast",
            "--json",
            "--log-dir",
            "/tmp/logs",
        ])
        .expect("check flags");
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.parallel, 8);
        assert!(args.fail_fast);
        assert!(args.json);
        assert_eq!(args.log_dir, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn clap_global_config_flag() {
        let cli = Cli::try_parse_from(["vibeguard", "check", "--config", "custom.yaml"])
            .expect("config flag");
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn clap_rejects_id_with_tag() {
        assert!(Cli::try_parse_from(["vibeguard", "check", "build", "--tag", "fast"]).is_err());
    }
}
