// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Configuration loading: discovery, YAML decoding, and line annotation.
//!
//! Decoding is permissive on purpose - fields arrive as raw strings and
//! untagged unions so the validator can report schema violations in a fixed
//! order with useful messages, instead of whatever serde happens to hit
//! first. The YAML node kind of event-handler values (scalar vs sequence) is
//! preserved through decoding; it is the only signal distinguishing inline
//! messages from prompt references.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::validate;
use super::{Config, ConfigError, EventHandler};

/// The only supported configuration schema version.
pub const SUPPORTED_VERSION: &str = "1";

/// File names probed by auto-discovery, in priority order.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "vibeguard.yaml",
    "vibeguard.yml",
    ".vibeguard.yaml",
    ".vibeguard.yml",
];

/// Find a configuration file in `dir`, probing [`CONFIG_FILE_NAMES`] in
/// order.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load and validate the configuration at `path`.
pub fn load_path(path: &Path) -> Result<Config, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&source)
}

/// Load and validate a configuration from YAML source text.
pub fn load_str(source: &str) -> Result<Config, ConfigError> {
    let mut raw: RawConfig = serde_yml::from_str(source)
        .map_err(|e| ConfigError::parse(e.location().map(|l| l.line()), e.to_string()))?;

    match raw.version.as_deref() {
        None => {
            return Err(ConfigError::validation(
                None,
                "missing required field 'version'",
            ))
        }
        Some(SUPPORTED_VERSION) => {}
        Some(other) => {
            return Err(ConfigError::validation(
                None,
                format!("unsupported config version '{other}' (expected \"{SUPPORTED_VERSION}\")"),
            ))
        }
    }

    annotate_lines(source, &mut raw);
    validate::validate(raw)
}

/// Raw decoded configuration, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    pub(crate) version: Option<String>,
    #[serde(default)]
    pub(crate) vars: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) prompts: Vec<RawPrompt>,
    #[serde(default)]
    pub(crate) checks: Vec<RawCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawPrompt {
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(skip)]
    pub(crate) line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawCheck {
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) run: Option<String>,
    #[serde(default)]
    pub(crate) grok: Option<OneOrMany>,
    #[serde(default)]
    pub(crate) file: Option<String>,
    #[serde(default, rename = "assert")]
    pub(crate) assert_expr: Option<String>,
    #[serde(default)]
    pub(crate) severity: Option<String>,
    #[serde(default)]
    pub(crate) suggestion: Option<String>,
    #[serde(default)]
    pub(crate) fix: Option<String>,
    #[serde(default)]
    pub(crate) requires: Vec<String>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) timeout: Option<RawTimeout>,
    #[serde(default, rename = "on")]
    pub(crate) on_event: EventHandler,
    #[serde(skip)]
    pub(crate) line: Option<usize>,
}

/// `grok:` accepts a single pattern string or a sequence of them; the
/// single-string form is normalized to a one-element sequence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(pattern) => vec![pattern],
            OneOrMany::Many(patterns) => patterns,
        }
    }
}

/// `timeout:` accepts a bare number of seconds or a humantime string such as
/// `30s` or `500ms`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTimeout {
    Seconds(u64),
    Text(String),
}

/// Recover source lines for checks and prompts by scanning the raw text for
/// their `id:` entries. serde does not carry node marks through derive, and
/// users rely on the line numbers in validation errors for debugging.
fn annotate_lines(source: &str, raw: &mut RawConfig) {
    let mut occurrences: Vec<(usize, &str)> = Vec::new();
    for (i, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix("- id:")
            .or_else(|| trimmed.strip_prefix("id:"));
        if let Some(rest) = rest {
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                occurrences.push((i + 1, value));
            }
        }
    }

    let mut used = vec![false; occurrences.len()];
    let mut take = |id: &str| -> Option<usize> {
        for (slot, (line, value)) in occurrences.iter().enumerate() {
            if !used[slot] && *value == id {
                used[slot] = true;
                return Some(*line);
            }
        }
        None
    };

    for prompt in &mut raw.prompts {
        if let Some(id) = &prompt.id {
            prompt.line = take(id);
        }
    }
    for check in &mut raw.checks {
        if let Some(id) = &check.id {
            check.line = take(id);
        }
    }
}
