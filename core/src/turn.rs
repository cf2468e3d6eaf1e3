//! The Turn Loop: `run_turn` drives one user input through a sequence of
//! provider steps, each possibly followed by a batch of tool calls, until
//! the model stops calling tools or a budget/cancellation boundary is hit.

use std::sync::Arc;

use cowork_protocol::ContentPart;
use cowork_protocol::Message;
use cowork_protocol::MessageRole;
use cowork_protocol::ReasoningKind;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::error::CoworkErr;
use crate::error::Result;
use crate::provider::EventStream;
use crate::provider::ModelStream;
use crate::provider::StepOverrides;
use crate::provider::StreamEvent;
use crate::provider::step_fully_resolved;
use crate::tools::ToolContext;
use crate::tools::ToolRegistry;
use crate::tools::ToolSpec;

pub const DEFAULT_STEP_BUDGET: usize = 50;

/// Callbacks the turn loop uses to surface streaming output. Kept separate
/// from `ToolContext`'s channels because these are turn-scoped, not
/// tool-call-scoped.
pub trait TurnObserver: Send + Sync {
    fn on_reasoning(&self, kind: ReasoningKind, text: &str);
    fn on_assistant_text(&self, text: &str);
    fn on_repair_log(&self, line: &str);
}

pub struct TurnOutcome {
    pub text: String,
    pub reasoning_text: String,
    pub cancelled: bool,
}

/// Appends `user_text` to `history`, then drives steps until the model
/// stops calling tools, the step budget is exhausted, or `abort` fires.
pub async fn run_turn(
    model: &dyn ModelStream,
    model_name: &str,
    provider_options: &serde_json::Value,
    tools: &ToolRegistry,
    tool_specs: &[ToolSpec],
    history: &mut Vec<Message>,
    user_text: &str,
    tool_ctx: &ToolContext,
    observer: &dyn TurnObserver,
    abort: Arc<Notify>,
    step_budget: usize,
) -> Result<TurnOutcome> {
    history.push(Message::user_text(user_text));

    let mut final_text = String::new();
    let mut reasoning_text = String::new();
    let mut overrides = StepOverrides::default();

    for _step in 0..step_budget {
        let repaired = repair_thought_signatures(history, &mut overrides, observer);
        if repaired {
            // one-step override only; restored for the step after.
        }

        let cancelled = abort.notified();
        tokio::select! {
            outcome = run_one_step(model, model_name, history, tool_specs, provider_options, &overrides, tools, tool_ctx, observer, &mut final_text, &mut reasoning_text) => {
                overrides = StepOverrides::default();
                match outcome? {
                    StepResult::Done => {
                        return Ok(TurnOutcome { text: final_text, reasoning_text, cancelled: false });
                    }
                    StepResult::Continue => continue,
                }
            }
            () = cancelled => {
                return Ok(TurnOutcome { text: final_text, reasoning_text, cancelled: true });
            }
        }
    }

    Err(CoworkErr::StepBudgetExceeded(step_budget))
}

enum StepResult {
    Done,
    Continue,
}

#[allow(clippy::too_many_arguments)]
async fn run_one_step(
    model: &dyn ModelStream,
    model_name: &str,
    history: &mut Vec<Message>,
    tool_specs: &[ToolSpec],
    provider_options: &serde_json::Value,
    overrides: &StepOverrides,
    tools: &ToolRegistry,
    tool_ctx: &ToolContext,
    observer: &dyn TurnObserver,
    final_text: &mut String,
    reasoning_text: &mut String,
) -> Result<StepResult> {
    let mut stream: EventStream = model.stream_step(
        model_name,
        history,
        tool_specs,
        provider_options,
        overrides,
    );

    let mut step_text = String::new();
    let mut step_content = Vec::new();
    let mut pending_calls: Vec<(String, String, serde_json::Value)> = Vec::new();
    let mut more = false;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta(delta) => {
                observer.on_assistant_text(&delta);
                step_text.push_str(&delta);
            }
            StreamEvent::Reasoning { kind, text } => {
                observer.on_reasoning(kind, &text);
                reasoning_text.push_str(&text);
                step_content.push(ContentPart::Reasoning {
                    text,
                    kind,
                    thought_signature: None,
                });
            }
            StreamEvent::ToolCall { id, name, arguments } => {
                pending_calls.push((id.clone(), name.clone(), arguments.clone()));
                step_content.push(ContentPart::ToolCall { id, name, arguments });
            }
            StreamEvent::StepEnd { more: step_more } => {
                more = step_more;
            }
        }
    }

    if !step_text.is_empty() {
        step_content.push(ContentPart::Text {
            text: step_text.clone(),
        });
        final_text.push_str(&step_text);
    }

    history.push(Message {
        role: MessageRole::Assistant,
        content: step_content,
    });

    // Execute tool calls strictly in receipt order.
    for (id, name, arguments) in &pending_calls {
        tool_ctx.log_entry(name, arguments);
        let result = tools
            .execute(name, tool_ctx, arguments.clone())
            .await
            .unwrap_or_else(Err);
        let (output, is_error) = match result {
            Ok(value) => (value.to_string(), false),
            Err(message) => (message, true),
        };
        tool_ctx.log_exit(name, &serde_json::json!({ "isError": is_error }));
        history.push(Message {
            role: MessageRole::ToolResult,
            content: vec![ContentPart::ToolResult {
                id: id.clone(),
                output,
                is_error,
            }],
        });
    }

    if pending_calls.is_empty() || !more {
        Ok(StepResult::Done)
    } else {
        Ok(StepResult::Continue)
    }
}

/// Strips an un-replayable reasoning signature and disables thought
/// generation for exactly the next step.
fn repair_thought_signatures(
    history: &mut [Message],
    overrides: &mut StepOverrides,
    observer: &dyn TurnObserver,
) -> bool {
    if step_fully_resolved(history) {
        return false;
    }

    let Some(last_assistant) = history
        .iter_mut()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
    else {
        return false;
    };

    let mut stripped = false;
    for part in &mut last_assistant.content {
        if let ContentPart::Reasoning {
            thought_signature, ..
        } = part
            && thought_signature.take().is_some()
        {
            stripped = true;
        }
    }

    if stripped {
        overrides.disable_thought_generation = true;
        observer.on_repair_log("stripped unresolved reasoning signature; thought generation disabled for one step");
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::ScriptedModel;
    use crate::tools::AskRequest;
    use crate::tools::ApprovalRequest;
    use std::sync::Mutex;

    struct NullObserver(Mutex<Vec<String>>);

    impl TurnObserver for NullObserver {
        fn on_reasoning(&self, _kind: ReasoningKind, _text: &str) {}
        fn on_assistant_text(&self, _text: &str) {}
        fn on_repair_log(&self, line: &str) {
            self.0.lock().expect("lock").push(line.to_string());
        }
    }

    fn test_ctx(dir: &std::path::Path) -> ToolContext {
        let (log_tx, _) = tokio::sync::mpsc::unbounded_channel::<String>();
        let (ask_tx, _) = tokio::sync::mpsc::unbounded_channel::<AskRequest>();
        let (approval_tx, _) = tokio::sync::mpsc::unbounded_channel::<ApprovalRequest>();
        let (todos_tx, _) = tokio::sync::mpsc::unbounded_channel();
        ToolContext::new(
            crate::path_sandbox::SandboxRoots {
                project_root: None,
                working_directory: dir.to_path_buf(),
                output_directory: None,
                uploads_directory: None,
            },
            Arc::new(Notify::new()),
            0,
            vec![],
            Arc::new(std::sync::Mutex::new(Default::default())),
            Arc::new(Default::default()),
            log_tx,
            ask_tx,
            approval_tx,
            todos_tx,
        )
    }

    #[tokio::test]
    async fn simple_greet_returns_text_with_no_tool_calls() {
        let model = Arc::new(ScriptedModel::new(vec![vec![
            StreamEvent::TextDelta("hello".to_string()),
            StreamEvent::StepEnd { more: false },
        ]]));
        let tmp = tempfile::tempdir().expect("tempdir");
        let registry = crate::tools::ToolRegistry::full(
            crate::tools::skill::SkillTool { skill_roots: vec![] },
            crate::tools::memory::MemoryTool {
                memory_root: tmp.path().join("memory"),
            },
            model.clone(),
            "gemini-3-flash-preview".to_string(),
            None,
        );
        let ctx = test_ctx(tmp.path());
        let observer = NullObserver(Mutex::new(Vec::new()));
        let mut history = Vec::new();

        let outcome = run_turn(
            model.as_ref(),
            "gemini-3-flash-preview",
            &serde_json::json!({}),
            &registry,
            &[],
            &mut history,
            "hi",
            &ctx,
            &observer,
            Arc::new(Notify::new()),
            DEFAULT_STEP_BUDGET,
        )
        .await
        .expect("turn");

        assert_eq!(outcome.text, "hello");
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn tool_call_result_is_appended_before_final_text() {
        let model = Arc::new(ScriptedModel::new(vec![
            vec![
                StreamEvent::ToolCall {
                    id: "call-1".to_string(),
                    name: "todo_write".to_string(),
                    arguments: serde_json::json!({ "todos": [] }),
                },
                StreamEvent::StepEnd { more: true },
            ],
            vec![
                StreamEvent::TextDelta("done".to_string()),
                StreamEvent::StepEnd { more: false },
            ],
        ]));
        let tmp = tempfile::tempdir().expect("tempdir");
        let registry = crate::tools::ToolRegistry::full(
            crate::tools::skill::SkillTool { skill_roots: vec![] },
            crate::tools::memory::MemoryTool {
                memory_root: tmp.path().join("memory"),
            },
            model.clone(),
            "gemini-3-flash-preview".to_string(),
            None,
        );
        let ctx = test_ctx(tmp.path());
        let observer = NullObserver(Mutex::new(Vec::new()));
        let mut history = Vec::new();

        let outcome = run_turn(
            model.as_ref(),
            "gemini-3-flash-preview",
            &serde_json::json!({}),
            &registry,
            &registry.specs(),
            &mut history,
            "clear my todos",
            &ctx,
            &observer,
            Arc::new(Notify::new()),
            DEFAULT_STEP_BUDGET,
        )
        .await
        .expect("turn");

        assert_eq!(outcome.text, "done");
        let tool_result = history
            .iter()
            .find(|m| m.role == MessageRole::ToolResult)
            .expect("a tool_result message was appended");
        match &tool_result.content[0] {
            ContentPart::ToolResult { id, is_error, .. } => {
                assert_eq!(id, "call-1");
                assert!(!is_error);
            }
            other => panic!("expected a ToolResult part, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolved_reasoning_signature_is_stripped_before_next_step() {
        let mut history = vec![Message {
            role: MessageRole::Assistant,
            content: vec![
                ContentPart::Reasoning {
                    text: "thinking".to_string(),
                    kind: ReasoningKind::Reasoning,
                    thought_signature: Some("sig-1".to_string()),
                },
                ContentPart::ToolCall {
                    id: "call-1".to_string(),
                    name: "shell".to_string(),
                    arguments: serde_json::json!({ "command": "ls" }),
                },
            ],
        }];
        let mut overrides = StepOverrides::default();
        let observer = NullObserver(Mutex::new(Vec::new()));

        let stripped = repair_thought_signatures(&mut history, &mut overrides, &observer);

        assert!(stripped);
        assert!(overrides.disable_thought_generation);
        assert_eq!(observer.0.lock().expect("lock").len(), 1);
        match &history[0].content[0] {
            ContentPart::Reasoning { thought_signature, .. } => assert!(thought_signature.is_none()),
            other => panic!("expected a Reasoning part, got {other:?}"),
        }
    }
}
