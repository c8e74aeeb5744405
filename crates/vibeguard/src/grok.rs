// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Grok-style structured extraction from command output.
//!
//! A pattern is a regular expression that may embed `%{TYPE:name}` macros;
//! each macro expands to a predefined sub-expression captured under `name`
//! (`%{TYPE}` without a name matches without capturing). Patterns are
//! applied independently to the full input in order; captures from later
//! patterns overwrite same-named captures from earlier ones, and a pattern
//! that does not match contributes nothing. Only a pattern that fails to
//! compile is an error.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

/// Capture-name to captured-value mapping produced by extraction.
pub type ExtractedMap = BTreeMap<String, String>;

/// Number of input bytes echoed into compile-failure diagnostics.
const INPUT_PREVIEW_BYTES: usize = 100;

/// A grok pattern failed to compile. Carries enough context to locate the
/// offending pattern and reproduce the input it was aimed at.
#[derive(Debug, Clone, Error)]
#[error("grok pattern {index} `{pattern}` failed to compile: {message} (input: {input_preview:?})")]
pub struct ExtractError {
    /// 0-based index of the failing pattern in the check's `grok` sequence.
    pub index: usize,
    /// The pattern text as configured.
    pub pattern: String,
    /// Why compilation failed.
    pub message: String,
    /// First 100 bytes of the extractor input, truncated with an ellipsis.
    pub input_preview: String,
}

/// Built-in macro table. `DATA` is non-greedy; `GREEDYDATA` is greedy.
const GROK_MACROS: &[(&str, &str)] = &[
    ("NUMBER", r"[+-]?[0-9]+(?:\.[0-9]+)?"),
    ("INT", r"[+-]?[0-9]+"),
    ("WORD", r"\b\w+\b"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    (
        "TIMESTAMP_ISO8601",
        r"[0-9]{4}-[0-9]{2}-[0-9]{2}[T ][0-9]{2}:[0-9]{2}(?::[0-9]{2}(?:\.[0-9]+)?)?(?:Z|[+-][0-9]{2}:?[0-9]{2})?",
    ),
    (
        "LOGLEVEL",
        r"(?i:trace|debug|info|notice|warn(?:ing)?|err(?:or)?|crit(?:ical)?|alert|fatal|severe|emerg(?:ency)?)",
    ),
    (
        "IP",
        r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)",
    ),
    ("IPV6", r"[0-9A-Fa-f]{0,4}(?::[0-9A-Fa-f]{0,4}){2,7}"),
    (
        "UUID",
        r"[0-9A-Fa-f]{8}-(?:[0-9A-Fa-f]{4}-){3}[0-9A-Fa-f]{12}",
    ),
];

/// Apply an ordered list of grok patterns to `input` and collect named
/// captures. Pure: identical inputs produce identical maps.
pub fn extract(patterns: &[String], input: &[u8]) -> Result<ExtractedMap, ExtractError> {
    let text = String::from_utf8_lossy(input);
    let mut captures = ExtractedMap::new();

    for (index, pattern) in patterns.iter().enumerate() {
        let regex = compile(pattern).map_err(|message| ExtractError {
            index,
            pattern: pattern.clone(),
            message,
            input_preview: input_preview(input),
        })?;

        if let Some(found) = regex.captures(&text) {
            for name in regex.capture_names().flatten() {
                if let Some(value) = found.name(name) {
                    captures.insert(name.to_string(), value.as_str().to_string());
                }
            }
        }
    }

    Ok(captures)
}

/// Expand `%{TYPE:name}` macros and compile the resulting expression.
fn compile(pattern: &str) -> Result<Regex, String> {
    let expanded = expand_macros(pattern)?;
    Regex::new(&expanded).map_err(|e| e.to_string())
}

fn expand_macros(pattern: &str) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find("%{") {
        out.push_str(&rest[..open]);
        let body_start = &rest[open + 2..];
        let close = body_start
            .find('}')
            .ok_or_else(|| format!("unterminated grok macro in `{pattern}`"))?;
        let body = &body_start[..close];
        let (macro_name, capture) = match body.split_once(':') {
            Some((m, c)) => (m, Some(c)),
            None => (body, None),
        };
        let expansion = GROK_MACROS
            .iter()
            .find(|(name, _)| *name == macro_name)
            .map(|(_, regex)| *regex)
            .ok_or_else(|| format!("unknown grok macro '{macro_name}'"))?;
        match capture {
            Some(name) => {
                if !is_valid_capture_name(name) {
                    return Err(format!("invalid grok capture name '{name}'"));
                }
                out.push_str(&format!("(?P<{name}>{expansion})"));
            }
            None => out.push_str(&format!("(?:{expansion})")),
        }
        rest = &body_start[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_valid_capture_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn input_preview(input: &[u8]) -> String {
    if input.len() <= INPUT_PREVIEW_BYTES {
        String::from_utf8_lossy(input).into_owned()
    } else {
        let mut preview = String::from_utf8_lossy(&input[..INPUT_PREVIEW_BYTES]).into_owned();
        preview.push_str("...");
        preview
    }
}
