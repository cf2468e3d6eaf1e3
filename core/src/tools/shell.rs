use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;
use crate::exec::ExecParams;
use crate::exec::run_shell;

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: Vec<String>,
    #[serde(default)]
    workdir: Option<PathBuf>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "command".to_string(),
            JsonSchema::Array {
                items: Box::new(JsonSchema::String { description: None }),
                description: Some("The command to execute, as argv".to_string()),
            },
        );
        properties.insert(
            "workdir".to_string(),
            JsonSchema::String {
                description: Some("Working directory for the command".to_string()),
            },
        );
        properties.insert(
            "timeout_ms".to_string(),
            JsonSchema::Number {
                description: Some("Timeout in milliseconds".to_string()),
            },
        );
        ToolSpec {
            name: "shell".to_string(),
            description: "Runs a shell command and returns stdout/stderr/exitCode".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["command".to_string()]),
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: ShellArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if args.command.is_empty() {
            return Err("command must not be empty".to_string());
        }

        let approved = ctx
            .approve_command(&args.command)
            .await
            .map_err(|e| e.to_string())?;
        if !approved {
            return Err("command was not approved".to_string());
        }

        let cwd = match &args.workdir {
            Some(w) => ctx
                .sandbox
                .resolve_read_path(w)
                .map_err(|e| e.to_string())?,
            None => ctx.sandbox.working_directory.clone(),
        };

        let output = run_shell(
            ExecParams {
                command: args.command,
                cwd,
                timeout_ms: args.timeout_ms,
            },
            ctx.abort.clone(),
        )
        .await
        .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exitCode": output.exit_code,
        }))
    }
}
