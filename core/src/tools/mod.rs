//! The closed tool-capability set: a variant type over {shell, read, write,
//! edit, glob, grep, webSearch, webFetch, ask, todoWrite, notebookEdit,
//! skill, memory, spawnAgent}.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use cowork_protocol::TodoItem;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::oneshot;

use crate::classifier::Classification;
use crate::error::CoworkErr;
use crate::error::Result;
use crate::path_sandbox::SandboxRoots;
use crate::tools::registry::SubAgentType;

pub mod ask;
pub mod edit;
pub mod glob_tool;
pub mod grep;
pub mod memory;
pub mod notebook_edit;
pub mod read;
pub mod registry;
pub mod shell;
pub mod skill;
pub mod spawn_agent;
pub mod todo_write;
pub mod web_fetch;
pub mod web_search;
pub mod write;

pub use registry::ToolRegistry;

/// Generic JSON-Schema subset needed to describe tool arguments, hand-built
/// rather than pulled from a schema-validation crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSchema {
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(alias = "integer")]
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        items: Box<JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Object {
        properties: BTreeMap<String, JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required: Option<Vec<String>>,
    },
}

/// What the provider adapter actually needs to describe a tool: the
/// `{name, inputSchema}` pair it advertises to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: JsonSchema,
}

/// Capability bundle injected into every tool call. Built fresh per call so
/// a tool can never close over the session itself, breaking the cyclic
/// tool/session reference.
pub struct ToolContext {
    pub sandbox: SandboxRoots,
    pub abort: Arc<Notify>,
    pub spawn_depth: u32,
    pub available_skills: Vec<String>,
    /// Closed set of tool names this context may dispatch, checked by
    /// `ToolRegistry::execute`. `None` means unrestricted (top-level turn).
    pub allowed_tools: Option<Arc<HashSet<String>>>,
    /// When set, `approve_command` never suspends on `approval_tx`: any
    /// `Classification::Prompt` verdict is treated as a denial.
    auto_deny_non_auto: bool,
    approved_commands: Arc<std::sync::Mutex<HashSet<Vec<String>>>>,
    deny_list: Arc<HashSet<Vec<String>>>,
    log_tx: tokio::sync::mpsc::UnboundedSender<String>,
    ask_tx: tokio::sync::mpsc::UnboundedSender<AskRequest>,
    approval_tx: tokio::sync::mpsc::UnboundedSender<ApprovalRequest>,
    todos_tx: tokio::sync::mpsc::UnboundedSender<Vec<TodoItem>>,
}

pub struct AskRequest {
    pub request_id: String,
    pub question: String,
    pub options: Option<Vec<String>>,
    pub reply: oneshot::Sender<String>,
}

pub struct ApprovalRequest {
    pub request_id: String,
    pub command: String,
    pub dangerous: bool,
    pub reason_code: String,
    pub reply: oneshot::Sender<bool>,
}

impl ToolContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sandbox: SandboxRoots,
        abort: Arc<Notify>,
        spawn_depth: u32,
        available_skills: Vec<String>,
        approved_commands: Arc<std::sync::Mutex<HashSet<Vec<String>>>>,
        deny_list: Arc<HashSet<Vec<String>>>,
        log_tx: tokio::sync::mpsc::UnboundedSender<String>,
        ask_tx: tokio::sync::mpsc::UnboundedSender<AskRequest>,
        approval_tx: tokio::sync::mpsc::UnboundedSender<ApprovalRequest>,
        todos_tx: tokio::sync::mpsc::UnboundedSender<Vec<TodoItem>>,
    ) -> Self {
        Self {
            sandbox,
            abort,
            spawn_depth,
            available_skills,
            allowed_tools: None,
            auto_deny_non_auto: false,
            approved_commands,
            deny_list,
            log_tx,
            ask_tx,
            approval_tx,
            todos_tx,
        }
    }

    /// Builds the restricted context `spawnAgent` hands to a sub-agent of
    /// `kind`: `askUser` is always disabled, the callable tool set is
    /// narrowed to `kind.tool_names()`, and `explore`/`research` sub-agents
    /// auto-deny any command that doesn't classify as `auto` outright rather
    /// than suspending on a client approval (the spawning turn already
    /// consented to `explore`/`research` running unsupervised; only
    /// `general` inherits the parent's normal approval flow).
    pub fn for_sub_agent(&self, kind: SubAgentType) -> ToolContext {
        let (log_tx, _) = tokio::sync::mpsc::unbounded_channel();
        let allowed_tools = Some(Arc::new(
            kind.tool_names().iter().map(|s| s.to_string()).collect(),
        ));
        ToolContext {
            sandbox: self.sandbox.clone(),
            abort: self.abort.clone(),
            spawn_depth: self.spawn_depth + 1,
            available_skills: self.available_skills.clone(),
            allowed_tools,
            auto_deny_non_auto: !matches!(kind, SubAgentType::General),
            approved_commands: self.approved_commands.clone(),
            deny_list: self.deny_list.clone(),
            log_tx,
            ask_tx: self.ask_tx.clone(),
            approval_tx: self.approval_tx.clone(),
            todos_tx: self.todos_tx.clone(),
        }
    }

    /// Emits a structured `tool> name args` / `tool< name result` log line;
    /// the UI parses these back into tool-call cards.
    pub fn log(&self, line: impl Into<String>) {
        let _ = self.log_tx.send(line.into());
    }

    pub fn log_entry(&self, name: &str, args: &serde_json::Value) {
        self.log(format!("tool> {name} {args}"));
    }

    pub fn log_exit(&self, name: &str, result: &serde_json::Value) {
        self.log(format!("tool< {name} {result}"));
    }

    pub fn update_todos(&self, todos: Vec<TodoItem>) -> Result<()> {
        if !cowork_protocol::session::at_most_one_in_progress(&todos) {
            return Err(CoworkErr::ToolValidation(
                "at most one todo may be in_progress".to_string(),
            ));
        }
        let _ = self.todos_tx.send(todos);
        Ok(())
    }

    /// Suspends until a client answers, or the abort handle fires. Every
    /// blocking primitive here must observe cancellation.
    pub async fn ask_user(&self, question: &str, options: Option<Vec<String>>) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let request_id = uuid::Uuid::new_v4().to_string();
        let _ = self.ask_tx.send(AskRequest {
            request_id,
            question: question.to_string(),
            options,
            reply: tx,
        });
        tokio::select! {
            answer = rx => answer.map_err(|_| CoworkErr::Cancelled),
            () = self.abort.notified() => Err(CoworkErr::Cancelled),
        }
    }

    /// Classifies `command`; short-circuits on `auto`/`deny`, else suspends
    /// for a client decision.
    pub async fn approve_command(&self, command: &[String]) -> Result<bool> {
        let approved = self.approved_commands.lock().expect("lock").clone();
        match crate::classifier::classify(command, &self.deny_list, &approved) {
            Classification::Auto => Ok(true),
            Classification::Deny { .. } => Ok(false),
            Classification::Prompt { .. } if self.auto_deny_non_auto => Ok(false),
            Classification::Prompt { risk, dangerous } => {
                let (tx, rx) = oneshot::channel();
                let request_id = uuid::Uuid::new_v4().to_string();
                let reason_code = reason_code(risk);
                let _ = self.approval_tx.send(ApprovalRequest {
                    request_id,
                    command: command.join(" "),
                    dangerous,
                    reason_code: reason_code.to_string(),
                    reply: tx,
                });
                let decision = tokio::select! {
                    decision = rx => decision.map_err(|_| CoworkErr::Cancelled)?,
                    () = self.abort.notified() => return Err(CoworkErr::Cancelled),
                };
                if decision {
                    self.approved_commands
                        .lock()
                        .expect("lock")
                        .insert(command.to_vec());
                }
                Ok(decision)
            }
        }
    }
}

fn reason_code(risk: crate::classifier::Risk) -> &'static str {
    use crate::classifier::Risk;
    match risk {
        Risk::RequiresManualReview => "requires_manual_review",
        Risk::FilesystemMutation => "filesystem_mutation",
        Risk::NetworkAccess => "network_access",
        Risk::PrivilegeEscalation => "privilege_escalation",
    }
}

/// A tool result. Errors are never propagated as turn failures (design
/// notes): the turn loop always turns an `Err` here into a `tool_result`
/// with `isError=true`.
pub type ToolOutput = std::result::Result<serde_json::Value, String>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, ctx: &ToolContext, args: serde_json::Value) -> ToolOutput;
}
