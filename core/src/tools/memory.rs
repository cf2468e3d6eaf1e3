use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use sha1::Digest;
use sha1::Sha1;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum MemoryArgs {
    Read { key: String },
    Write { content: String },
    Search { query: String },
}

/// A persistent markdown store segmented by scope, keyed by the content
/// hash of each entry.
pub struct MemoryTool {
    pub memory_root: PathBuf,
}

#[async_trait]
impl Tool for MemoryTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "op".to_string(),
            JsonSchema::String {
                description: Some("read | write | search".to_string()),
            },
        );
        properties.insert(
            "key".to_string(),
            JsonSchema::String {
                description: Some("Content-addressed key, for read".to_string()),
            },
        );
        properties.insert(
            "content".to_string(),
            JsonSchema::String {
                description: Some("Markdown content to persist, for write".to_string()),
            },
        );
        properties.insert(
            "query".to_string(),
            JsonSchema::String {
                description: Some("Substring to search for, for search".to_string()),
            },
        );
        ToolSpec {
            name: "memory".to_string(),
            description: "Reads, writes, or searches persistent markdown memory".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["op".to_string()]),
            },
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: MemoryArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(&self.memory_root)
            .await
            .map_err(|e| e.to_string())?;

        match args {
            MemoryArgs::Write { content } => {
                let key = content_key(&content);
                let path = self.memory_root.join(format!("{key}.md"));
                tokio::fs::write(&path, &content)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "key": key }))
            }
            MemoryArgs::Read { key } => {
                let key = safe_entry_name(&key)?;
                let path = self.memory_root.join(format!("{key}.md"));
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "content": content }))
            }
            MemoryArgs::Search { query } => {
                let mut hits = Vec::new();
                let mut entries = tokio::fs::read_dir(&self.memory_root)
                    .await
                    .map_err(|e| e.to_string())?;
                while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
                    if let Ok(content) = tokio::fs::read_to_string(entry.path()).await
                        && content.contains(&query)
                    {
                        hits.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                Ok(serde_json::json!({ "keys": hits }))
            }
        }
    }
}

fn content_key(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rejects anything that isn't a bare filename stem: no separators, no
/// `..`, nothing that could walk a client-supplied key out of
/// `memory_root`.
fn safe_entry_name(name: &str) -> Result<&str, String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(format!("invalid memory key: {name}"));
    }
    Ok(name)
}
