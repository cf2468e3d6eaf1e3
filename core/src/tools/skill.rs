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
struct SkillArgs {
    name: String,
}

/// Looks up a markdown skill document by name under the session's
/// configured skill directories.
pub struct SkillTool {
    pub skill_roots: Vec<PathBuf>,
}

#[async_trait]
impl Tool for SkillTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "name".to_string(),
            JsonSchema::String {
                description: Some("Skill name to load".to_string()),
            },
        );
        ToolSpec {
            name: "skill".to_string(),
            description: "Loads a markdown skill document on demand".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["name".to_string()]),
            },
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: SkillArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let name = safe_entry_name(&args.name)?;
        for root in &self.skill_roots {
            let candidate = root.join(format!("{name}.md"));
            if let Ok(content) = tokio::fs::read_to_string(&candidate).await {
                return Ok(serde_json::json!({ "content": content }));
            }
        }
        Err(format!("no skill named {:?} found", args.name))
    }
}

/// Rejects anything that isn't a bare filename stem: no separators, no
/// `..`, nothing that could walk a client-supplied name out of a skill
/// root.
fn safe_entry_name(name: &str) -> Result<&str, String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(format!("invalid skill name: {name}"));
    }
    Ok(name)
}
