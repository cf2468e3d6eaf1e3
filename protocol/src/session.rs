//! Data model entities: `Session`, `Message`, `TodoItem`.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Immutable-after-turn-start snapshot of a session's configuration.
///
/// `provider_options` is deliberately an opaque, provider-tagged value bag:
/// the engine must not inspect its interior (design notes, "dynamic JSON
/// objects").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub_agent_model: Option<String>,
    pub working_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uploads_directory: Option<PathBuf>,
    #[serde(default)]
    pub enabled_capabilities: Vec<String>,
    /// Provider-specific option bag. Never inspected by the engine; passed
    /// through verbatim to the provider adapter.
    #[serde(default)]
    pub provider_options: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolResult,
    Reasoning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    Reasoning,
    Summary,
}

/// A single part of a `Message`'s content. A message's `content` is an
/// ordered list of these so a single assistant turn can interleave text,
/// reasoning, and tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        kind: ReasoningKind,
        /// Provider-opaque token that must round-trip unchanged across
        /// turns. Only ever read or written by the provider adapter
        /// boundary.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        thought_signature: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        id: String,
        output: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// The concatenation of every `Text` part in this message, if any.
    pub fn text(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        if out.is_empty() { None } else { Some(out) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub active_form: String,
    pub status: TodoStatus,
}

/// Enforces the at-most-one-`in_progress`-entry rule.
pub fn at_most_one_in_progress(todos: &[TodoItem]) -> bool {
    todos
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .count()
        <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let msg = Message {
            role: MessageRole::Assistant,
            content: vec![
                ContentPart::Text {
                    text: "a".to_string(),
                },
                ContentPart::ToolCall {
                    id: "1".to_string(),
                    name: "shell".to_string(),
                    arguments: serde_json::json!({}),
                },
                ContentPart::Text {
                    text: "b".to_string(),
                },
            ],
        };
        assert_eq!(msg.text().as_deref(), Some("ab"));
    }

    #[test]
    fn at_most_one_in_progress_rejects_two() {
        let todos = vec![
            TodoItem {
                content: "a".into(),
                active_form: "doing a".into(),
                status: TodoStatus::InProgress,
            },
            TodoItem {
                content: "b".into(),
                active_form: "doing b".into(),
                status: TodoStatus::InProgress,
            },
        ];
        assert!(!at_most_one_in_progress(&todos));
    }
}
