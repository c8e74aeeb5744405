//! Variable substitution and report-time template rendering.
//!
//! Two distinct phases share the `{{.name}}` placeholder syntax:
//!
//! 1. Load-time substitution replaces every literal `{{.K}}` for a defined
//!    variable K in command, assertion, suggestion, fix, file, and grok
//!    fields. Undefined references remain as literal text, which makes the
//!    pass idempotent. No shell escaping is performed: the same author
//!    controls both the variables and the commands that consume them.
//! 2. Report-time rendering fills suggestion/fix templates from the merged
//!    map of extracted captures and variables (variables win on collision).
//!    Any parse or lookup failure returns the original string unrendered;
//!    rendering is never fatal.

use std::collections::BTreeMap;

/// Replace every literal `{{.K}}` where K is a defined variable key.
/// Plain text substitution, applied in sorted key order.
pub fn substitute_vars(input: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = input.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{.{key}}}}}"), value);
    }
    out
}

/// Merge extracted captures with configured variables; on key collision the
/// configured variable wins.
pub fn merged_values(
    vars: &BTreeMap<String, String>,
    extracted: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = extracted.clone();
    for (key, value) in vars {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Render a dotted-name template against a value map. Returns the original
/// template unchanged on any parse error (stray or malformed `{{ }}`) or
/// when a referenced name is not present in the map.
pub fn render_template(template: &str, values: &BTreeMap<String, String>) -> String {
    match try_render(template, values) {
        Some(rendered) => rendered,
        None => template.to_string(),
    }
}

fn try_render(template: &str, values: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}")?;
        let name = parse_placeholder(&after_open[..close])?;
        out.push_str(values.get(name)?);
        rest = &after_open[close + 2..];
    }
    if rest.contains("}}") {
        return None;
    }
    out.push_str(rest);
    Some(out)
}

/// A placeholder body is `.name` with optional surrounding spaces; the name
/// uses the identifier charset shared with capture names.
fn parse_placeholder(body: &str) -> Option<&str> {
    let name = body.trim().strip_prefix('.')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return None;
    }
    Some(name)
}
