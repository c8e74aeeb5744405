//! Event-handler dispatch: map a finished check's status onto its `on:`
//! slots and resolve each value into a [`TriggeredPrompt`].
//!
//! A sequence value is a list of prompt references resolved through the
//! configuration's prompt table (guaranteed present by validation); a scalar
//! value is emitted verbatim as inline content. Cancelled and skipped
//! results fire no events. After validation, dispatch never fails.

use crate::config::{Check, Config, EventValue};
use crate::report::{CheckStatus, EventKind, PromptSource, TriggeredPrompt};

/// Resolve the triggered prompts for a finished check.
pub fn dispatch(config: &Config, check: &Check, status: CheckStatus) -> Vec<TriggeredPrompt> {
    let (value, event) = match status {
        CheckStatus::Timedout => (&check.on_event.timeout, EventKind::Timeout),
        CheckStatus::Failed => (&check.on_event.failure, EventKind::Failure),
        CheckStatus::Passed => (&check.on_event.success, EventKind::Success),
        CheckStatus::Cancelled | CheckStatus::Skipped => return Vec::new(),
    };

    match value {
        None => Vec::new(),
        Some(EventValue::Inline(content)) => vec![TriggeredPrompt {
            event,
            source: PromptSource::Inline,
            content: content.clone(),
        }],
        Some(EventValue::References(ids)) => ids
            .iter()
            .filter_map(|id| {
                let prompt = config.prompt(id);
                if prompt.is_none() {
                    // Unreachable after validation; dropping the reference is
                    // still better than failing a finished check.
                    tracing::warn!(prompt = %id, "triggered prompt not found");
                }
                prompt.map(|p| TriggeredPrompt {
                    event,
                    source: PromptSource::Id,
                    content: p.content.clone(),
                })
            })
            .collect(),
    }
}
