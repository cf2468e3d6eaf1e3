use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

#[derive(Debug, Deserialize)]
struct GlobArgs {
    pattern: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Matches file names against a glob pattern, gitignore-aware (the same
/// tree-walker ripgrep uses).
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "pattern".to_string(),
            JsonSchema::String {
                description: Some("Glob pattern, e.g. **/*.rs".to_string()),
            },
        );
        properties.insert(
            "path".to_string(),
            JsonSchema::String {
                description: Some("Directory to search from (default: working directory)".to_string()),
            },
        );
        ToolSpec {
            name: "glob".to_string(),
            description: "Finds files matching a glob pattern".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["pattern".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: GlobArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let root = match &args.path {
            Some(p) => ctx.sandbox.resolve_read_path(p).map_err(|e| e.to_string())?,
            None => ctx.sandbox.working_directory.clone(),
        };

        let mut overrides = OverrideBuilder::new(&root);
        overrides.add(&args.pattern).map_err(|e| e.to_string())?;
        let overrides = overrides.build().map_err(|e| e.to_string())?;

        let mut matches = Vec::new();
        for entry in WalkBuilder::new(&root).overrides(overrides).build() {
            let entry = entry.map_err(|e| e.to_string())?;
            if entry.file_type().is_some_and(|t| t.is_file()) {
                matches.push(entry.path().display().to_string());
            }
        }
        matches.sort();

        Ok(serde_json::json!({ "files": matches }))
    }
}
