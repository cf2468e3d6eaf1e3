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
struct EditArgs {
    file_path: PathBuf,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "file_path".to_string(),
            JsonSchema::String {
                description: Some("Path to the file to edit".to_string()),
            },
        );
        properties.insert(
            "old_string".to_string(),
            JsonSchema::String {
                description: Some("Exact text to replace".to_string()),
            },
        );
        properties.insert(
            "new_string".to_string(),
            JsonSchema::String {
                description: Some("Replacement text".to_string()),
            },
        );
        properties.insert(
            "replace_all".to_string(),
            JsonSchema::Boolean {
                description: Some("Replace every occurrence instead of requiring uniqueness".to_string()),
            },
        );
        ToolSpec {
            name: "edit".to_string(),
            description: "Replaces an exact string occurrence in a file".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec![
                    "file_path".to_string(),
                    "old_string".to_string(),
                    "new_string".to_string(),
                ]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: EditArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if args.old_string.is_empty() {
            return Err("old_string must not be empty".to_string());
        }

        let resolved = ctx
            .sandbox
            .resolve_write_path(&args.file_path)
            .map_err(|e| e.to_string())?;
        let original = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| e.to_string())?;

        let occurrences = original.matches(&args.old_string).count();
        if occurrences == 0 {
            return Err(format!("old_string not found in {}", args.file_path.display()));
        }
        if occurrences > 1 && !args.replace_all {
            return Err(format!(
                "old_string occurs {occurrences} times; pass replace_all=true or narrow the match"
            ));
        }

        let updated = if args.replace_all {
            original.replace(&args.old_string, &args.new_string)
        } else {
            original.replacen(&args.old_string, &args.new_string, 1)
        };

        tokio::fs::write(&resolved, &updated)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({ "replacements": if args.replace_all { occurrences } else { 1 } }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        let (log_tx, _) = tokio::sync::mpsc::unbounded_channel();
        let (ask_tx, _) = tokio::sync::mpsc::unbounded_channel();
        let (approval_tx, _) = tokio::sync::mpsc::unbounded_channel();
        let (todos_tx, _) = tokio::sync::mpsc::unbounded_channel();
        ToolContext::new(
            crate::path_sandbox::SandboxRoots {
                project_root: None,
                working_directory: dir.to_path_buf(),
                output_directory: None,
                uploads_directory: None,
            },
            Arc::new(tokio::sync::Notify::new()),
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
    async fn rejects_ambiguous_match_without_replace_all() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("f.txt");
        tokio::fs::write(&file, "aa").await.expect("write");

        let tool = EditTool;
        let context = ctx(tmp.path());
        let result = tool
            .execute(
                &context,
                serde_json::json!({"file_path": "f.txt", "old_string": "a", "new_string": "b"}),
            )
            .await;
        assert!(result.is_err());
        let unchanged = tokio::fs::read_to_string(&file).await.expect("read");
        assert_eq!(unchanged, "aa");
    }

    #[tokio::test]
    async fn replace_all_rewrites_every_occurrence() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("f.txt");
        tokio::fs::write(&file, "aa").await.expect("write");

        let tool = EditTool;
        let context = ctx(tmp.path());
        tool.execute(
            &context,
            serde_json::json!({"file_path": "f.txt", "old_string": "a", "new_string": "b", "replace_all": true}),
        )
        .await
        .expect("edit");
        let updated = tokio::fs::read_to_string(&file).await.expect("read");
        assert_eq!(updated, "bb");
    }
}
