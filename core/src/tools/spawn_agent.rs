use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;

use async_trait::async_trait;
use cowork_protocol::Message;
use serde::Deserialize;
use tokio::sync::Notify;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;
use super::registry::SubAgentType;
use crate::error::CoworkErr;
use crate::provider::ModelStream;
use crate::turn::DEFAULT_STEP_BUDGET;
use crate::turn::TurnObserver;
use crate::turn::run_turn;

const MAX_SPAWN_DEPTH: u32 = 3;

#[derive(Debug, Deserialize)]
struct SpawnAgentArgs {
    #[serde(rename = "type")]
    sub_agent_type: String,
    prompt: String,
}

struct SilentObserver;
impl TurnObserver for SilentObserver {
    fn on_reasoning(&self, _kind: cowork_protocol::ReasoningKind, _text: &str) {}
    fn on_assistant_text(&self, _text: &str) {}
    fn on_repair_log(&self, _line: &str) {}
}

/// Runs a nested Turn Loop with a restricted tool subset.
/// `spawn_agent` is never itself offered to a sub-agent: depth is enforced
/// via `ToolContext::spawn_depth`, not by hiding the tool name recursively
/// from the registry the sub-agent receives.
pub struct SpawnAgentTool {
    pub registry: Weak<super::ToolRegistry>,
    pub model: Arc<dyn ModelStream>,
    pub model_name: String,
    pub sub_agent_model_name: Option<String>,
}

#[async_trait]
impl Tool for SpawnAgentTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "type".to_string(),
            JsonSchema::String {
                description: Some("explore | research | general".to_string()),
            },
        );
        properties.insert(
            "prompt".to_string(),
            JsonSchema::String {
                description: Some("Task for the sub-agent".to_string()),
            },
        );
        ToolSpec {
            name: "spawn_agent".to_string(),
            description: "Runs a restricted nested agent turn and returns its final text".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["type".to_string(), "prompt".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        if ctx.spawn_depth >= MAX_SPAWN_DEPTH {
            return Err(format!(
                "spawn depth limit of {MAX_SPAWN_DEPTH} exceeded"
            ));
        }
        let args: SpawnAgentArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let kind = match args.sub_agent_type.as_str() {
            "explore" => SubAgentType::Explore,
            "research" => SubAgentType::Research,
            "general" => SubAgentType::General,
            other => return Err(format!("unknown sub-agent type: {other}")),
        };
        let registry = self
            .registry
            .upgrade()
            .ok_or("tool registry was dropped")?;

        let sub_ctx = ctx.for_sub_agent(kind);
        let tool_specs = registry.specs_for(kind);
        let model_name = self
            .sub_agent_model_name
            .clone()
            .unwrap_or_else(|| self.model_name.clone());

        let mut history: Vec<Message> = Vec::new();
        let observer = SilentObserver;
        let outcome = run_turn(
            self.model.as_ref(),
            &model_name,
            &serde_json::json!({}),
            &registry,
            &tool_specs,
            &mut history,
            &args.prompt,
            &sub_ctx,
            &observer,
            Arc::new(Notify::new()),
            DEFAULT_STEP_BUDGET,
        )
        .await
        .map_err(|e: CoworkErr| e.to_string())?;

        Ok(serde_json::json!({ "text": outcome.text }))
    }
}
