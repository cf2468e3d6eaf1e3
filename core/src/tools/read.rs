use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_path: PathBuf,
}

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "file_path".to_string(),
            JsonSchema::String {
                description: Some("Path to the file to read".to_string()),
            },
        );
        ToolSpec {
            name: "read".to_string(),
            description: "Reads a UTF-8 text file".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["file_path".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: ReadArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let resolved = ctx
            .sandbox
            .resolve_read_path(&args.file_path)
            .map_err(|e| e.to_string())?;
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "content": content }))
    }
}
