//! Provider adapter boundary: the tool-capability set and provider options
//! bag are both kept opaque on this side of the line.
//!
//! `cowork-core` never speaks a concrete provider wire format itself; it
//! drives turns against the [`ModelStream`] trait, and a concrete adapter
//! (OpenAI-compatible, Anthropic, Gemini, ...) implements it. Only the
//! adapter interior knows what `provider_options` means.

use std::collections::HashMap;
use std::pin::Pin;

use cowork_protocol::ContentPart;
use cowork_protocol::Message;
use cowork_protocol::MessageRole;
use cowork_protocol::ReasoningKind;
use futures::Stream;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::tools::ToolSpec;

pub mod echo;
pub mod mock;

/// Serializable representation of a provider definition, analogous to a
/// model-router entry: friendly name, API base, and the environment
/// variable that carries the user's key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProviderInfo {
    pub name: String,
    pub base_url: String,
    pub env_key: String,
    pub default_model: String,
}

impl ModelProviderInfo {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.env_key).ok()
    }
}

/// Built-in provider defaults.
pub fn built_in_model_providers() -> HashMap<String, ModelProviderInfo> {
    [
        (
            "openai",
            ModelProviderInfo {
                name: "OpenAI".into(),
                base_url: "https://api.openai.com/v1".into(),
                env_key: "OPENAI_API_KEY".into(),
                default_model: "gpt-5.1".into(),
            },
        ),
        (
            "anthropic",
            ModelProviderInfo {
                name: "Anthropic".into(),
                base_url: "https://api.anthropic.com/v1".into(),
                env_key: "ANTHROPIC_API_KEY".into(),
                default_model: "claude-opus-4-6".into(),
            },
        ),
        (
            "google",
            ModelProviderInfo {
                name: "Google".into(),
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
                env_key: "GEMINI_API_KEY".into(),
                default_model: "gemini-3-flash-preview".into(),
            },
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// One chunk of a provider's streamed reply to a step.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    Reasoning { kind: ReasoningKind, text: String },
    ToolCall { id: String, name: String, arguments: serde_json::Value },
    /// The provider has finished emitting this step; `more` indicates
    /// whether it expects another round (tool calls pending execution).
    StepEnd { more: bool },
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Per-step options the turn loop overrides for one repair step (opaque
/// reasoning signatures) without touching the session's persisted
/// `provider_options`.
#[derive(Debug, Clone, Default)]
pub struct StepOverrides {
    pub disable_thought_generation: bool,
}

/// The seam between the turn loop and a concrete provider SDK.
pub trait ModelStream: Send + Sync {
    /// Opens a stream for the next step given the running message history,
    /// the closed tool set the engine exposes, and the session's opaque
    /// provider option bag.
    fn stream_step(
        &self,
        model: &str,
        history: &[Message],
        tools: &[ToolSpec],
        provider_options: &serde_json::Value,
        overrides: &StepOverrides,
    ) -> EventStream;
}

/// True iff every tool call emitted in the last assistant message of
/// `history` has a matching `tool_result` among the `ToolResult`-role
/// messages that follow it. Tool results are always appended as their own
/// history entries (`run_one_step` never writes them back into the
/// assistant message's own `content`), so this has to look past that one
/// message. Governs whether a reasoning signature may be replayed on the
/// next call.
pub fn step_fully_resolved(history: &[Message]) -> bool {
    let Some(last_assistant_idx) = history.iter().rposition(|m| m.role == MessageRole::Assistant)
    else {
        return true;
    };

    let calls: Vec<&str> = history[last_assistant_idx]
        .content
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolCall { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    if calls.is_empty() {
        return true;
    }

    let results: std::collections::HashSet<&str> = history[last_assistant_idx + 1..]
        .iter()
        .filter(|m| m.role == MessageRole::ToolResult)
        .flat_map(|m| {
            m.content.iter().filter_map(|p| match p {
                ContentPart::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
        })
        .collect();
    calls.iter().all(|id| results.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unresolved_tool_call() {
        let history = vec![Message {
            role: MessageRole::Assistant,
            content: vec![
                ContentPart::Reasoning {
                    text: "thinking".into(),
                    kind: ReasoningKind::Reasoning,
                    thought_signature: Some("sig-1".into()),
                },
                ContentPart::ToolCall {
                    id: "call-1".into(),
                    name: "shell".into(),
                    arguments: serde_json::json!({}),
                },
            ],
        }];
        assert!(!step_fully_resolved(&history));
    }

    #[test]
    fn resolved_step_has_matching_result_in_later_message() {
        let history = vec![
            Message {
                role: MessageRole::Assistant,
                content: vec![ContentPart::ToolCall {
                    id: "call-1".into(),
                    name: "shell".into(),
                    arguments: serde_json::json!({}),
                }],
            },
            Message {
                role: MessageRole::ToolResult,
                content: vec![ContentPart::ToolResult {
                    id: "call-1".into(),
                    output: "ok".into(),
                    is_error: false,
                }],
            },
        ];
        assert!(step_fully_resolved(&history));
    }

    #[test]
    fn assistant_message_with_no_tool_calls_is_resolved() {
        let history = vec![Message {
            role: MessageRole::Assistant,
            content: vec![ContentPart::Text {
                text: "done".into(),
            }],
        }];
        assert!(step_fully_resolved(&history));
    }
}
