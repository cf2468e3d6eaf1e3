use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

#[derive(Debug, Deserialize)]
struct AskArgs {
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
}

/// Exposes `ToolContext::ask_user` as a tool so models can solicit
/// structured answers.
pub struct AskTool;

#[async_trait]
impl Tool for AskTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "question".to_string(),
            JsonSchema::String {
                description: Some("Question to ask the user".to_string()),
            },
        );
        properties.insert(
            "options".to_string(),
            JsonSchema::Array {
                items: Box::new(JsonSchema::String { description: None }),
                description: Some("Optional suggested answers".to_string()),
            },
        );
        ToolSpec {
            name: "ask".to_string(),
            description: "Asks the user a question and waits for a reply".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["question".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: AskArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let answer = ctx
            .ask_user(&args.question, args.options)
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "answer": answer }))
    }
}
