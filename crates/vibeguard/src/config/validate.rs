// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Structural validation and execution planning.
//!
//! Validation runs top-to-bottom (vars, prompts, checks) and stops at the
//! first offense, annotated with the source line of the offending node where
//! available. Within one check the order is fixed: id presence, id format,
//! id uniqueness, `run` presence, severity, tags, timeout, assertion/grok
//! pairing, `requires` integrity, event-handler prompt resolution. After
//! per-node validation, cycle detection walks the whole `requires` graph by
//! depth-first search with three-colour marking, and the acyclic graph is
//! flattened into execution levels.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use super::interpolate;
use super::loader::{RawCheck, RawConfig, RawPrompt, RawTimeout};
use super::{Check, Config, ConfigError, EventValue, Prompt, Severity, DEFAULT_CHECK_TIMEOUT};

pub(crate) fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
    let RawConfig {
        vars,
        prompts: raw_prompts,
        checks: raw_checks,
        ..
    } = raw;

    for key in vars.keys() {
        if key.is_empty() {
            return Err(ConfigError::validation(
                None,
                "variable names must not be empty",
            ));
        }
    }

    let prompts = validate_prompts(raw_prompts)?;
    let prompt_ids: HashSet<&str> = prompts.iter().map(|p| p.id.as_str()).collect();

    if raw_checks.is_empty() {
        return Err(ConfigError::validation(
            None,
            "configuration defines no checks",
        ));
    }

    // Existence checks for `requires` must see every id, including ones
    // defined later in the file.
    let all_check_ids: HashSet<String> = raw_checks
        .iter()
        .filter_map(|c| c.id.clone())
        .collect();

    let mut checks = Vec::with_capacity(raw_checks.len());
    let mut seen_ids: HashSet<String> = HashSet::new();
    for raw_check in raw_checks {
        let check = validate_check(raw_check, &vars, &seen_ids, &all_check_ids, &prompt_ids)?;
        seen_ids.insert(check.id.clone());
        checks.push(check);
    }

    let index: HashMap<&str, usize> = checks
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    if let Some(cycle) = find_cycle(&checks, &index) {
        return Err(ConfigError::validation(
            None,
            format!("cyclic dependency detected: {cycle}"),
        ));
    }

    let levels = compute_levels(&checks, &index);
    Ok(Config::new(vars, prompts, checks, levels))
}

fn validate_prompts(raw_prompts: Vec<RawPrompt>) -> Result<Vec<Prompt>, ConfigError> {
    let mut prompts = Vec::with_capacity(raw_prompts.len());
    let mut seen: HashSet<String> = HashSet::new();
    for raw in raw_prompts {
        let line = raw.line;
        let id = match raw.id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(ConfigError::validation(
                    line,
                    "prompt is missing required field 'id'",
                ))
            }
        };
        if !is_valid_id(&id) {
            return Err(ConfigError::validation(
                line,
                format!("invalid prompt id '{id}': must match ^[A-Za-z_][A-Za-z0-9_-]*$"),
            ));
        }
        if !seen.insert(id.clone()) {
            return Err(ConfigError::validation(
                line,
                format!("duplicate prompt id '{id}'"),
            ));
        }
        let content = match raw.content {
            Some(content) if !content.is_empty() => content,
            _ => {
                return Err(ConfigError::validation(
                    line,
                    format!("prompt '{id}' is missing required field 'content'"),
                ))
            }
        };
        for tag in &raw.tags {
            if !is_valid_tag(tag) {
                return Err(ConfigError::validation(
                    line,
                    format!("prompt '{id}' has invalid tag '{tag}': must match ^[a-z][a-z0-9-]*$"),
                ));
            }
        }
        prompts.push(Prompt {
            id,
            description: raw.description,
            content,
            tags: raw.tags,
            line,
        });
    }
    Ok(prompts)
}

fn validate_check(
    raw: RawCheck,
    vars: &BTreeMap<String, String>,
    seen_ids: &HashSet<String>,
    all_check_ids: &HashSet<String>,
    prompt_ids: &HashSet<&str>,
) -> Result<Check, ConfigError> {
    let line = raw.line;
    let id = match raw.id {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(ConfigError::validation(
                line,
                "check is missing required field 'id'",
            ))
        }
    };
    if !is_valid_id(&id) {
        return Err(ConfigError::validation(
            line,
            format!("invalid check id '{id}': must match ^[A-Za-z_][A-Za-z0-9_-]*$"),
        ));
    }
    if seen_ids.contains(&id) {
        return Err(ConfigError::validation(
            line,
            format!("duplicate check id '{id}'"),
        ));
    }

    let run = match raw.run {
        Some(run) if !run.is_empty() => run,
        _ => {
            return Err(ConfigError::validation(
                line,
                format!("check '{id}' is missing required field 'run'"),
            ))
        }
    };

    let severity = match raw.severity.as_deref() {
        None => Severity::Error,
        Some("error") => Severity::Error,
        Some("warning") => Severity::Warning,
        Some(other) => {
            return Err(ConfigError::validation(
                line,
                format!("check '{id}' has invalid severity '{other}' (expected 'error' or 'warning')"),
            ))
        }
    };

    for tag in &raw.tags {
        if !is_valid_tag(tag) {
            return Err(ConfigError::validation(
                line,
                format!("check '{id}' has invalid tag '{tag}': must match ^[a-z][a-z0-9-]*$"),
            ));
        }
    }

    let timeout = match raw.timeout {
        None => DEFAULT_CHECK_TIMEOUT,
        Some(RawTimeout::Seconds(secs)) => Duration::from_secs(secs),
        Some(RawTimeout::Text(text)) => humantime::parse_duration(&text).map_err(|e| {
            ConfigError::validation(
                line,
                format!("check '{id}' has invalid timeout '{text}': {e}"),
            )
        })?,
    };
    if timeout.is_zero() {
        return Err(ConfigError::validation(
            line,
            format!("check '{id}' has invalid timeout: must be positive"),
        ));
    }

    let grok = raw.grok.map(|g| g.into_vec()).unwrap_or_default();
    if raw.assert_expr.is_some() && grok.is_empty() {
        return Err(ConfigError::validation(
            line,
            format!("check '{id}' has an assertion but no grok patterns to extract values"),
        ));
    }

    for dep in &raw.requires {
        if dep == &id {
            return Err(ConfigError::validation(
                line,
                format!("check '{id}' requires itself"),
            ));
        }
        if !all_check_ids.contains(dep) {
            return Err(ConfigError::validation(
                line,
                format!("check '{id}' requires unknown check '{dep}'"),
            ));
        }
    }

    for (slot, value) in [
        ("success", &raw.on_event.success),
        ("failure", &raw.on_event.failure),
        ("timeout", &raw.on_event.timeout),
    ] {
        if let Some(EventValue::References(ids)) = value {
            for prompt_id in ids {
                if !prompt_ids.contains(prompt_id.as_str()) {
                    return Err(ConfigError::validation(
                        line,
                        format!("check '{id}' references unknown prompt '{prompt_id}' in on.{slot}"),
                    ));
                }
            }
        }
    }

    Ok(Check {
        run: interpolate::substitute_vars(&run, vars),
        grok: grok
            .iter()
            .map(|p| interpolate::substitute_vars(p, vars))
            .collect(),
        file: raw
            .file
            .map(|f| PathBuf::from(interpolate::substitute_vars(&f, vars))),
        assert_expr: raw
            .assert_expr
            .map(|a| interpolate::substitute_vars(&a, vars)),
        severity,
        suggestion: raw
            .suggestion
            .map(|s| interpolate::substitute_vars(&s, vars)),
        fix: raw.fix.map(|f| interpolate::substitute_vars(&f, vars)),
        requires: raw.requires,
        tags: raw.tags,
        timeout,
        on_event: raw.on_event,
        line,
        id,
    })
}

fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Three-colour DFS over the `requires` graph. Returns the cycle rendered as
/// `a -> b -> ... -> a` on the first back-edge into a grey node.
fn find_cycle(checks: &[Check], index: &HashMap<&str, usize>) -> Option<String> {
    let mut marks = vec![Mark::White; checks.len()];
    let mut stack: Vec<usize> = Vec::new();
    for start in 0..checks.len() {
        if marks[start] == Mark::White {
            if let Some(cycle) = visit(start, checks, index, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    checks: &[Check],
    index: &HashMap<&str, usize>,
    marks: &mut Vec<Mark>,
    stack: &mut Vec<usize>,
) -> Option<String> {
    marks[node] = Mark::Grey;
    stack.push(node);
    for dep in &checks[node].requires {
        let Some(&next) = index.get(dep.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::Grey => {
                let root = stack.iter().position(|&n| n == next).unwrap_or(0);
                let mut names: Vec<&str> =
                    stack[root..].iter().map(|&n| checks[n].id.as_str()).collect();
                names.push(checks[next].id.as_str());
                return Some(names.join(" -> "));
            }
            Mark::White => {
                if let Some(cycle) = visit(next, checks, index, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Black => {}
        }
    }
    stack.pop();
    marks[node] = Mark::Black;
    None
}

/// Assign each check a level equal to 1 + the maximum level among its
/// requires (0 if none), then group ids by level in configuration order.
fn compute_levels(checks: &[Check], index: &HashMap<&str, usize>) -> Vec<Vec<String>> {
    let mut memo: Vec<Option<usize>> = vec![None; checks.len()];
    let mut max_level = 0;
    for i in 0..checks.len() {
        max_level = max_level.max(level_of(i, checks, index, &mut memo));
    }

    let mut levels: Vec<Vec<String>> = vec![Vec::new(); max_level + 1];
    for (i, check) in checks.iter().enumerate() {
        if let Some(level) = memo[i] {
            levels[level].push(check.id.clone());
        }
    }
    levels
}

fn level_of(
    node: usize,
    checks: &[Check],
    index: &HashMap<&str, usize>,
    memo: &mut Vec<Option<usize>>,
) -> usize {
    if let Some(level) = memo[node] {
        return level;
    }
    let level = checks[node]
        .requires
        .iter()
        .filter_map(|dep| index.get(dep.as_str()).copied())
        .map(|dep| level_of(dep, checks, index, memo) + 1)
        .max()
        .unwrap_or(0);
    memo[node] = Some(level);
    level
}
