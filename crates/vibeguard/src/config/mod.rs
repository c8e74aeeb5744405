// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! # Configuration Model
//!
//! The immutable, validated representation of a VibeGuard configuration:
//! checks, variables, prompts, and event handlers. Instances are produced by
//! [`loader::load_str`] (or [`loader::load_path`]) and never mutated
//! afterwards; every lookup during execution goes through the id-indexed
//! tables built at validation time.
//!
//! The dependency graph is a DAG of string ids, not pointer-linked nodes.
//! [`Config::levels`] exposes the authoritative execution levels computed by
//! the validator: level 0 checks have no prerequisites, and a check at level
//! L may start only after every check at levels < L has terminated.

pub mod interpolate;
pub mod loader;
pub mod validate;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default per-check timeout when the configuration does not set one.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while loading or validating a configuration.
///
/// All variants are fatal to the run and map to exit code 2. Messages carry
/// the source line of the offending node where one could be determined.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No configuration file was found during auto-discovery.
    #[error("no configuration file found in {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the schema.
    #[error("{message}")]
    Parse {
        /// Rendered message, including the source line when available
        message: String,
        /// Source line of the offense, when the parser reported one
        line: Option<usize>,
    },

    /// The decoded document violates a structural invariant.
    #[error("{message}")]
    Validation {
        /// Rendered message, including the source line when available
        message: String,
        /// Source line of the offending node, when known
        line: Option<usize>,
    },
}

impl ConfigError {
    pub(crate) fn parse(line: Option<usize>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match line {
            Some(n) => format!("line {n}: {message}"),
            None => message,
        };
        ConfigError::Parse { message, line }
    }

    pub(crate) fn validation(line: Option<usize>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match line {
            Some(n) => format!("line {n}: {message}"),
            None => message,
        };
        ConfigError::Validation { message, line }
    }

    /// Source line associated with the error, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ConfigError::Parse { line, .. } | ConfigError::Validation { line, .. } => *line,
            _ => None,
        }
    }
}

/// Check severity. Warnings are reported but never produce a non-zero exit
/// code, and a failing warning does not block its dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failure counts as a violation and participates in fail-fast.
    #[default]
    Error,
    /// Failure is advisory only.
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One handler value attached to an event slot.
///
/// The YAML node kind is the discriminator and is load-bearing: a scalar is
/// always an inline message (even when its text coincides with a prompt id),
/// while a sequence is always a list of prompt references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    /// Ordered prompt ids; each must name a defined prompt.
    References(Vec<String>),
    /// Literal message text, emitted verbatim.
    Inline(String),
}

/// Outcome-keyed event handlers for a check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventHandler {
    /// Fired when the check passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<EventValue>,
    /// Fired when the check fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<EventValue>,
    /// Fired when the check times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<EventValue>,
}

impl EventHandler {
    /// True when no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.failure.is_none() && self.timeout.is_none()
    }
}

fn event_handler_is_empty(handler: &EventHandler) -> bool {
    handler.is_empty()
}

/// A named unit of work: a shell command plus optional extraction,
/// assertion, and metadata. All template variables have already been
/// substituted into the command, patterns, and message fields at load time.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    /// Unique identifier (`^[A-Za-z_][A-Za-z0-9_-]*$`).
    pub id: String,
    /// Shell command, run via `sh -c`.
    pub run: String,
    /// Ordered grok patterns applied to the extractor input.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grok: Vec<String>,
    /// Optional file whose contents replace command output as the extractor
    /// input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Optional assertion over the extracted map.
    #[serde(rename = "assert", skip_serializing_if = "Option::is_none")]
    pub assert_expr: Option<String>,
    pub severity: Severity,
    /// Template rendered into the report when the check does not pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Template describing a remediation command or edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    /// Ids of checks that must pass before this one runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Wall-clock limit for the command.
    #[serde(serialize_with = "duration_text::serialize")]
    pub timeout: Duration,
    /// Outcome event handlers.
    #[serde(rename = "on", skip_serializing_if = "event_handler_is_empty")]
    pub on_event: EventHandler,
    /// Source line of the check in the configuration file.
    #[serde(skip)]
    pub line: Option<usize>,
}

impl Check {
    /// True when the check carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Stored textual material surfaced on certain check outcomes. Prompts are
/// data; they are never executed.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    /// Unique identifier (same format rules as check ids).
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The prompt body, emitted verbatim when referenced.
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Source line of the prompt in the configuration file.
    #[serde(skip)]
    pub line: Option<usize>,
}

/// A validated configuration. Read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Template variables, already substituted into check fields.
    pub vars: BTreeMap<String, String>,
    /// Prompts in definition order.
    pub prompts: Vec<Prompt>,
    /// Checks in definition order.
    pub checks: Vec<Check>,
    levels: Vec<Vec<String>>,
    check_index: HashMap<String, usize>,
    prompt_index: HashMap<String, usize>,
}

impl Config {
    pub(crate) fn new(
        vars: BTreeMap<String, String>,
        prompts: Vec<Prompt>,
        checks: Vec<Check>,
        levels: Vec<Vec<String>>,
    ) -> Self {
        let check_index = checks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        let prompt_index = prompts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        Self {
            vars,
            prompts,
            checks,
            levels,
            check_index,
            prompt_index,
        }
    }

    /// Look up a check by id.
    pub fn check(&self, id: &str) -> Option<&Check> {
        self.check_index.get(id).map(|&i| &self.checks[i])
    }

    /// Position of a check in the `checks` sequence.
    pub(crate) fn check_position(&self, id: &str) -> Option<usize> {
        self.check_index.get(id).copied()
    }

    /// Look up a prompt by id.
    pub fn prompt(&self, id: &str) -> Option<&Prompt> {
        self.prompt_index.get(id).map(|&i| &self.prompts[i])
    }

    /// Execution levels in run order. Every check id appears in exactly one
    /// level; within a level, ids keep their configuration order.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Level of a single check, as computed by the validator.
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|c| c == id))
    }

    /// Serialize the canonical YAML form of the configuration. Loading the
    /// result yields an equivalent configuration (interpolation already
    /// applied, so re-interpolating is a no-op).
    pub fn to_canonical_yaml(&self) -> Result<String, serde_yml::Error> {
        #[derive(Serialize)]
        struct CanonicalDoc<'a> {
            version: &'a str,
            vars: &'a BTreeMap<String, String>,
            prompts: &'a [Prompt],
            checks: &'a [Check],
        }
        serde_yml::to_string(&CanonicalDoc {
            version: loader::SUPPORTED_VERSION,
            vars: &self.vars,
            prompts: &self.prompts,
            checks: &self.checks,
        })
    }
}

mod duration_text {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }
}
