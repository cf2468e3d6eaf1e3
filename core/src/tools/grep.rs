use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use ignore::WalkBuilder;
use regex_lite::Regex;
use serde::Deserialize;
use tokio::process::Command;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;
use crate::rg_cache;

#[derive(Debug, Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Searches file contents via an external `rg` binary when one is on PATH
/// or cached; falls back to an in-process `ignore` walk + regex scan.
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "pattern".to_string(),
            JsonSchema::String {
                description: Some("Regular expression to search for".to_string()),
            },
        );
        properties.insert(
            "path".to_string(),
            JsonSchema::String {
                description: Some("Directory to search (default: working directory)".to_string()),
            },
        );
        ToolSpec {
            name: "grep".to_string(),
            description: "Searches file contents for a regular expression".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["pattern".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: GrepArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let root = match &args.path {
            Some(p) => ctx.sandbox.resolve_read_path(p).map_err(|e| e.to_string())?,
            None => ctx.sandbox.working_directory.clone(),
        };

        if let Some(home) = dirs::home_dir()
            && let Ok(output) = run_external_rg(&home, &args.pattern, &root).await
        {
            return Ok(output);
        }

        fallback_grep(&args.pattern, &root)
    }
}

async fn run_external_rg(
    home: &std::path::Path,
    pattern: &str,
    root: &std::path::Path,
) -> Result<serde_json::Value, ()> {
    let rg_path = match which_rg() {
        Some(path) => path,
        None => rg_cache::ensure_ripgrep(home).await.map_err(|_| ())?,
    };

    let output = Command::new(rg_path)
        .arg("--line-number")
        .arg(pattern)
        .arg(root)
        .output()
        .await
        .map_err(|_| ())?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok(serde_json::json!({ "matches": stdout }))
}

fn which_rg() -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(if cfg!(windows) { "rg.exe" } else { "rg" }))
            .find(|p| p.is_file())
    })
}

fn fallback_grep(pattern: &str, root: &std::path::Path) -> ToolOutput {
    let re = Regex::new(pattern).map_err(|e| e.to_string())?;
    let mut matches = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = entry.map_err(|e| e.to_string())?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (line_no, line) in content.lines().enumerate() {
            if re.is_match(line) {
                matches.push(format!("{}:{}:{}", entry.path().display(), line_no + 1, line));
            }
        }
    }
    Ok(serde_json::json!({ "matches": matches.join("\n") }))
}
