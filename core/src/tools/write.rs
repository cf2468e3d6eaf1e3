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
struct WriteArgs {
    file_path: PathBuf,
    content: String,
}

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "file_path".to_string(),
            JsonSchema::String {
                description: Some("Path to the file to write".to_string()),
            },
        );
        properties.insert(
            "content".to_string(),
            JsonSchema::String {
                description: Some("Full file content".to_string()),
            },
        );
        ToolSpec {
            name: "write".to_string(),
            description: "Writes (overwrites) a UTF-8 text file".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["file_path".to_string(), "content".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: WriteArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let resolved = ctx
            .sandbox
            .resolve_write_path(&args.file_path)
            .map_err(|e| e.to_string())?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }
        tokio::fs::write(&resolved, &args.content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "bytesWritten": args.content.len() }))
    }
}
