use std::collections::BTreeMap;

use async_trait::async_trait;
use cowork_protocol::TodoItem;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

#[derive(Debug, Deserialize)]
struct TodoWriteArgs {
    todos: Vec<TodoItem>,
}

/// Replaces the session's todo list, enforcing the at-most-one-in-progress
/// invariant.
pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "todos".to_string(),
            JsonSchema::Array {
                items: Box::new(JsonSchema::Object {
                    properties: BTreeMap::new(),
                    required: None,
                }),
                description: Some("The full replacement todo list".to_string()),
            },
        );
        ToolSpec {
            name: "todo_write".to_string(),
            description: "Replaces the session todo list".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["todos".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: TodoWriteArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        ctx.update_todos(args.todos.clone())
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "count": args.todos.len() }))
    }
}
