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
#[serde(rename_all = "snake_case")]
enum EditMode {
    Replace,
    Insert,
    Delete,
}

#[derive(Debug, Deserialize)]
struct NotebookEditArgs {
    file_path: PathBuf,
    cell_index: usize,
    #[serde(default = "default_mode")]
    mode: EditMode,
    #[serde(default)]
    new_source: Option<String>,
}

fn default_mode() -> EditMode {
    EditMode::Replace
}

/// Parses the target as a Jupyter notebook and applies a replace/insert/
/// delete on a cell index.
pub struct NotebookEditTool;

#[async_trait]
impl Tool for NotebookEditTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "file_path".to_string(),
            JsonSchema::String {
                description: Some("Path to a .ipynb file".to_string()),
            },
        );
        properties.insert(
            "cell_index".to_string(),
            JsonSchema::Number {
                description: Some("Zero-based cell index".to_string()),
            },
        );
        properties.insert(
            "mode".to_string(),
            JsonSchema::String {
                description: Some("replace | insert | delete".to_string()),
            },
        );
        properties.insert(
            "new_source".to_string(),
            JsonSchema::String {
                description: Some("New cell source for replace/insert".to_string()),
            },
        );
        ToolSpec {
            name: "notebook_edit".to_string(),
            description: "Edits a cell in a Jupyter notebook".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["file_path".to_string(), "cell_index".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: NotebookEditArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if args.file_path.extension().and_then(|e| e.to_str()) != Some("ipynb") {
            return Err("notebook_edit requires a .ipynb file".to_string());
        }

        let resolved = ctx
            .sandbox
            .resolve_write_path(&args.file_path)
            .map_err(|e| e.to_string())?;
        let raw = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| e.to_string())?;
        let mut notebook: serde_json::Value = serde_json::from_str(&raw).map_err(|e| e.to_string())?;

        let cells = notebook
            .get_mut("cells")
            .and_then(|c| c.as_array_mut())
            .ok_or("notebook has no cells array")?;

        match args.mode {
            EditMode::Delete => {
                if args.cell_index >= cells.len() {
                    return Err("cell_index out of range".to_string());
                }
                cells.remove(args.cell_index);
            }
            EditMode::Replace => {
                let source = args.new_source.ok_or("replace requires new_source")?;
                let cell = cells
                    .get_mut(args.cell_index)
                    .ok_or("cell_index out of range")?;
                cell["source"] = serde_json::json!(source);
            }
            EditMode::Insert => {
                let source = args.new_source.ok_or("insert requires new_source")?;
                if args.cell_index > cells.len() {
                    return Err("cell_index out of range".to_string());
                }
                cells.insert(
                    args.cell_index,
                    serde_json::json!({
                        "cell_type": "code",
                        "metadata": {},
                        "source": source,
                        "outputs": [],
                        "execution_count": serde_json::Value::Null,
                    }),
                );
            }
        }
        let cell_count = cells.len();

        let serialized = serde_json::to_string_pretty(&notebook).map_err(|e| e.to_string())?;
        tokio::fs::write(&resolved, serialized)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({ "cellCount": cell_count }))
    }
}
