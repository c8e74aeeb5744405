use std::time::Duration;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use vibeguard::{CheckResult, CheckStatus, ReportSummary};

/// Print error message
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "ERROR:".bright_red().bold(), msg);
}

/// Print warning message
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "WARNING:".bright_yellow().bold(), msg);
}

/// Print success message
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green().bold(), msg);
}

/// Print info message
#[allow(dead_code)] // Reserved for informational notices alongside the other print helpers
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue().bold(), msg);
}

/// Create a formatted table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.2}s", millis as f64 / 1_000.0)
    } else {
        let minutes = millis / 60_000;
        let seconds = (millis % 60_000) / 1_000;
        format!("{minutes}m {seconds}s")
    }
}

fn status_label(status: CheckStatus) -> String {
    match status {
        CheckStatus::Passed => "PASS".bright_green().to_string(),
        CheckStatus::Failed => "FAIL".bright_red().bold().to_string(),
        CheckStatus::Timedout => "TIMEOUT".bright_yellow().bold().to_string(),
        CheckStatus::Cancelled => "CANCELLED".bright_magenta().to_string(),
        CheckStatus::Skipped => "SKIP".bright_black().to_string(),
    }
}

fn print_result(result: &CheckResult) {
    match result.status {
        CheckStatus::Skipped => {
            let reason = result.skip_reason.as_deref().unwrap_or("skipped");
            println!(
                "{} {} ({})",
                status_label(result.status),
                result.check_id.bright_white(),
                reason.bright_black()
            );
        }
        _ => {
            println!(
                "{} {} ({}, exit {})",
                status_label(result.status),
                result.check_id.bright_white(),
                format_duration(result.duration),
                result.exit_code
            );
        }
    }

    if let Some(failure) = &result.failure {
        println!("  {} {}", "error:".bright_red(), failure);
    }
    if result.status != CheckStatus::Passed {
        if let Some(suggestion) = &result.suggestion {
            println!("  {} {}", "suggestion:".bold(), suggestion);
        }
        if let Some(fix) = &result.fix {
            println!("  {} {}", "fix:".bold(), fix);
        }
    }
    for prompt in &result.triggered_prompts {
        println!(
            "  {} [{}] {}",
            "prompt".bright_cyan(),
            prompt.event,
            prompt.content
        );
    }
    if let Some(log_file) = &result.log_file {
        println!("  {} {}", "log:".bright_black(), log_file.display());
    }
}

/// Render the human-readable report. Passed checks are elided unless
/// `verbose` is set; the summary line always prints.
pub fn render_summary(summary: &ReportSummary, verbose: bool) {
    for result in &summary.checks {
        if result.status == CheckStatus::Passed && !verbose {
            continue;
        }
        print_result(result);
    }

    let line = format!(
        "{} checks: {} passed, {} failed, {} timed out, {} cancelled, {} skipped",
        summary.checks.len(),
        summary.count(CheckStatus::Passed),
        summary.count(CheckStatus::Failed),
        summary.count(CheckStatus::Timedout),
        summary.count(CheckStatus::Cancelled),
        summary.count(CheckStatus::Skipped),
    );
    println!();
    if summary.violations.is_empty() {
        println!("{}", line.bright_green());
    } else {
        println!("{}", line.bright_red());
        println!("violations: {}", summary.violations.join(", "));
    }
    if summary.fail_fast_triggered {
        print_warning("fail-fast triggered; remaining checks were skipped");
    }
}
