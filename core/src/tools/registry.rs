use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;
use super::ask::AskTool;
use super::edit::EditTool;
use super::glob_tool::GlobTool;
use super::grep::GrepTool;
use super::memory::MemoryTool;
use super::notebook_edit::NotebookEditTool;
use super::read::ReadTool;
use super::shell::ShellTool;
use super::skill::SkillTool;
use super::spawn_agent::SpawnAgentTool;
use super::todo_write::TodoWriteTool;
use super::web_fetch::WebFetchTool;
use super::web_search::WebSearchTool;
use super::write::WriteTool;
use crate::provider::ModelStream;

/// Sub-agent tool subsets for the `spawnAgent` contract. `spawnAgent` itself
/// is deliberately excluded from every subset: depth is enforced by
/// `ToolContext::spawn_depth`, not by re-offering the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAgentType {
    Explore,
    Research,
    General,
}

impl SubAgentType {
    pub fn tool_names(self) -> &'static [&'static str] {
        match self {
            SubAgentType::Explore => &["shell", "read", "glob", "grep"],
            SubAgentType::Research => &["read", "web_search", "web_fetch"],
            SubAgentType::General => &[
                "read",
                "write",
                "edit",
                "glob",
                "grep",
                "web_search",
                "web_fetch",
                "notebook_edit",
                "skill",
                "memory",
            ],
        }
    }
}

/// The closed set of tools a session can call, keyed by stable name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds the full registry, including `spawn_agent`, which needs a
    /// back-reference to the registry it is part of. Built via
    /// `Arc::new_cyclic` and held as a `Weak` inside `spawn_agent` so the
    /// registry and the tool it contains don't form a leaking `Rc` cycle.
    pub fn full(
        skill: SkillTool,
        memory: MemoryTool,
        model: Arc<dyn ModelStream>,
        model_name: String,
        sub_agent_model_name: Option<String>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ToolRegistry>| {
            let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
            tools.insert("shell".to_string(), Arc::new(ShellTool));
            tools.insert("read".to_string(), Arc::new(ReadTool));
            tools.insert("write".to_string(), Arc::new(WriteTool));
            tools.insert("edit".to_string(), Arc::new(EditTool));
            tools.insert("glob".to_string(), Arc::new(GlobTool));
            tools.insert("grep".to_string(), Arc::new(GrepTool));
            tools.insert("web_search".to_string(), Arc::new(WebSearchTool));
            tools.insert("web_fetch".to_string(), Arc::new(WebFetchTool));
            tools.insert("ask".to_string(), Arc::new(AskTool));
            tools.insert("todo_write".to_string(), Arc::new(TodoWriteTool));
            tools.insert("notebook_edit".to_string(), Arc::new(NotebookEditTool));
            tools.insert("skill".to_string(), Arc::new(skill));
            tools.insert("memory".to_string(), Arc::new(memory));
            tools.insert(
                "spawn_agent".to_string(),
                Arc::new(SpawnAgentTool {
                    registry: weak.clone(),
                    model,
                    model_name,
                    sub_agent_model_name,
                }),
            );
            Self { tools }
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// The specs visible for a sub-agent of `kind`.
    pub fn specs_for(&self, kind: SubAgentType) -> Vec<ToolSpec> {
        kind.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|t| t.spec())
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput, String> {
        if let Some(allowed) = &ctx.allowed_tools
            && !allowed.contains(name)
        {
            return Err(format!("tool not available to this sub-agent: {name}"));
        }
        match self.tools.get(name) {
            Some(tool) => Ok(tool.execute(ctx, args).await),
            None => Err(format!("unknown tool: {name}")),
        }
    }
}
