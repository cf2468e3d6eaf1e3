//! Session Registry: session id → session, creation, resume from storage,
//! close.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cowork_core::Session;
use cowork_core::config::Config;
use cowork_core::provider::ModelStream;
use cowork_core::tools::ToolRegistry;
use cowork_protocol::SessionConfig;
use cowork_protocol::SessionStatus;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::SessionRecord;
use crate::store::SessionStore;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    store: Arc<dyn SessionStore>,
    config: Config,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelStream>,
    deny_list: Arc<std::collections::HashSet<Vec<String>>>,
}

impl SessionRegistry {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        model: Arc<dyn ModelStream>,
    ) -> Arc<Self> {
        let deny_list = Arc::new(config.command_deny_list.clone());
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            config,
            tools,
            model,
            deny_list,
        })
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// `session_open {sessionId?}`: with no id, always creates. With an id,
    /// returns the live session if attached, else rehydrates from storage.
    ///
    /// Policy decision (see DESIGN.md): a resumed session's
    /// `working_directory` is restored verbatim even if it no longer exists
    /// on disk — `path_sandbox` already tolerates a missing leaf by
    /// canonicalising the longest existing ancestor, so silently
    /// substituting a different directory would surprise the user more than
    /// deferring the failure to the first path operation that actually
    /// needs it.
    pub async fn open(self: &Arc<Self>, requested: Uuid) -> std::io::Result<(Arc<Session>, bool)> {
        if let Some(session) = self.get(requested).await {
            return Ok((session, true));
        }

        if let Some(record) = self.store.load(requested).await? {
            let session_config = SessionConfig {
                provider: record.provider,
                model: record.model,
                sub_agent_model: self.config.sub_agent_model.clone(),
                working_directory: record.working_directory,
                output_directory: record.output_directory,
                uploads_directory: record.uploads_directory,
                enabled_capabilities: vec![],
                provider_options: serde_json::json!({}),
            };
            let session = Session::new_with_deny_list(
                requested,
                session_config,
                self.tools.clone(),
                self.model.clone(),
                self.deny_list.clone(),
            );
            session
                .rehydrate(
                    record.messages_json,
                    record.todos_json,
                    record.status,
                    record.last_event_seq,
                )
                .await;
            if let Some(dir) = &self.config.rollout_dir {
                let _ = session.attach_rollout(dir).await;
            }
            self.sessions.write().await.insert(requested, session.clone());
            return Ok((session, true));
        }

        Ok((self.create(Some(requested)).await, false))
    }

    pub async fn create(self: &Arc<Self>, id: Option<Uuid>) -> Arc<Session> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        let session_config = SessionConfig {
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            sub_agent_model: self.config.sub_agent_model.clone(),
            working_directory: cwd,
            output_directory: None,
            uploads_directory: None,
            enabled_capabilities: vec![],
            provider_options: serde_json::json!({}),
        };
        let session = Session::new_with_deny_list(
            id,
            session_config,
            self.tools.clone(),
            self.model.clone(),
            self.deny_list.clone(),
        );
        if let Some(dir) = &self.config.rollout_dir {
            let _ = session.attach_rollout(dir).await;
        }
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    pub async fn close(&self, id: Uuid) -> std::io::Result<()> {
        if let Some(session) = self.sessions.write().await.remove(&id) {
            session.close().await;
            self.persist(&session).await?;
        }
        Ok(())
    }

    pub async fn persist(&self, session: &Arc<Session>) -> std::io::Result<()> {
        let config = session.config_snapshot().await;
        let messages = session.messages_snapshot().await;
        let todos = session.todos_snapshot().await;
        let status = session.status().await;
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session.id,
            title: None,
            title_source: None,
            title_model: None,
            status,
            created_at: now,
            updated_at: now,
            provider: config.provider,
            model: config.model,
            working_directory: config.working_directory,
            output_directory: config.output_directory,
            uploads_directory: config.uploads_directory,
            enable_mcp: false,
            system_prompt: None,
            has_pending_ask: false,
            has_pending_approval: false,
            message_count: messages.len(),
            last_event_seq: session.event_seq(),
            messages_json: messages,
            todos_json: todos,
            harness_context_json: serde_json::json!({}),
        };
        self.store.save(&record).await
    }

    /// `list_sessions`: live sessions first, then anything only on disk.
    pub async fn list(&self) -> std::io::Result<Vec<SessionRecord>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for session in self.sessions.read().await.values() {
            seen.insert(session.id);
            let config = session.config_snapshot().await;
            out.push(SessionRecord {
                session_id: session.id,
                title: None,
                title_source: None,
                title_model: None,
                status: session.status().await,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                provider: config.provider,
                model: config.model,
                working_directory: config.working_directory,
                output_directory: config.output_directory,
                uploads_directory: config.uploads_directory,
                enable_mcp: false,
                system_prompt: None,
                has_pending_ask: false,
                has_pending_approval: false,
                message_count: session.messages_snapshot().await.len(),
                last_event_seq: session.event_seq(),
                messages_json: vec![],
                todos_json: session.todos_snapshot().await,
                harness_context_json: serde_json::json!({}),
            });
        }
        for record in self.store.list().await? {
            if !seen.contains(&record.session_id) {
                out.push(record);
            }
        }
        Ok(out)
    }
}
