//! The Session Engine: the single writer for one session's state. `busy`
//! gates re-entrancy; reset/close cancel and drain the active turn before
//! mutating state.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use cowork_protocol::Message;
use cowork_protocol::ReasoningKind;
use cowork_protocol::ServerEvent;
use cowork_protocol::ServerEventMsg;
use cowork_protocol::SessionConfig;
use cowork_protocol::SessionStatus;
use cowork_protocol::TodoItem;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::broadcast;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::Result;
use crate::path_sandbox::SandboxRoots;
use crate::provider::ModelStream;
use crate::provider::built_in_model_providers;
use crate::rollout::RolloutRecorder;
use crate::tools::ApprovalRequest;
use crate::tools::AskRequest;
use crate::tools::ToolContext;
use crate::tools::ToolRegistry;
use crate::turn::DEFAULT_STEP_BUDGET;
use crate::turn::TurnObserver;
use crate::turn::run_turn;

const EVENT_BUFFER: usize = 256;

enum PendingReply {
    Ask(oneshot::Sender<String>),
    Approval(oneshot::Sender<bool>),
}

/// Mutable state a turn reads and writes. Held behind `inner` so `reset`
/// and `close` can take a consistent snapshot while a turn is cancelling.
struct SessionInner {
    messages: Vec<Message>,
    todos: Vec<TodoItem>,
    status: SessionStatus,
    has_pending_ask: bool,
    has_pending_approval: bool,
}

pub struct Session {
    pub id: Uuid,
    config: Mutex<SessionConfig>,
    inner: Mutex<SessionInner>,
    busy: AtomicBool,
    event_seq: AtomicU64,
    cancel: Mutex<Option<Arc<Notify>>>,
    turn_done: Notify,
    pending_replies: Mutex<HashMap<String, PendingReply>>,
    events_tx: broadcast::Sender<ServerEvent>,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelStream>,
    deny_list: Arc<HashSet<Vec<String>>>,
    approved_commands: Arc<std::sync::Mutex<HashSet<Vec<String>>>>,
    rollout: Mutex<Option<RolloutRecorder>>,
}

impl Session {
    pub fn new(
        id: Uuid,
        config: SessionConfig,
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelStream>,
    ) -> Arc<Self> {
        Self::new_with_deny_list(id, config, registry, model, Arc::new(HashSet::new()))
    }

    pub fn new_with_deny_list(
        id: Uuid,
        config: SessionConfig,
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelStream>,
        deny_list: Arc<HashSet<Vec<String>>>,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            id,
            config: Mutex::new(config),
            inner: Mutex::new(SessionInner {
                messages: Vec::new(),
                todos: Vec::new(),
                status: SessionStatus::Open,
                has_pending_ask: false,
                has_pending_approval: false,
            }),
            busy: AtomicBool::new(false),
            event_seq: AtomicU64::new(0),
            cancel: Mutex::new(None),
            turn_done: Notify::new(),
            pending_replies: Mutex::new(HashMap::new()),
            events_tx,
            registry,
            model,
            deny_list,
            approved_commands: Arc::new(std::sync::Mutex::new(HashSet::new())),
            rollout: Mutex::new(None),
        })
    }

    /// Opens (or reopens, on resume) this session's rollout transcript.
    /// Absent a call to this, turns still run — rollout persistence is an
    /// optional side effect, not a precondition: the in-memory `messages`
    /// vec stays the authoritative source either way.
    pub async fn attach_rollout(&self, rollout_dir: &std::path::Path) -> std::io::Result<()> {
        let config = self.config.lock().await;
        let recorder = RolloutRecorder::new(rollout_dir, self.id, &config.provider, &config.model).await?;
        *self.rollout.lock().await = Some(recorder);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// The current high-water mark of this session's `eventSeq` counter,
    /// i.e. the sequence number that will be assigned to the *next* emitted
    /// event. Persisted on `persist()` and restored via `rehydrate()` so a
    /// resumed session's counter never restarts at 0.
    pub fn event_seq(&self) -> u64 {
        self.event_seq.load(Ordering::SeqCst)
    }

    /// A direct reply to a client request that isn't a turn side effect
    /// (`list_tools`, `list_sessions`, provider/harness scaffolding). Still
    /// draws from the session's own `eventSeq` counter so ordering holds.
    pub async fn direct_reply(&self, msg: ServerEventMsg) -> ServerEvent {
        let seq = self.event_seq.fetch_add(1, Ordering::SeqCst);
        let event = ServerEvent::new(self.id, seq, msg);
        let _ = self.events_tx.send(event.clone());
        event
    }

    pub fn tool_specs(&self) -> Vec<crate::tools::ToolSpec> {
        self.registry.specs()
    }

    async fn emit(&self, msg: ServerEventMsg) {
        let seq = self.event_seq.fetch_add(1, Ordering::SeqCst);
        let _ = self.events_tx.send(ServerEvent::new(self.id, seq, msg));
    }

    pub async fn server_hello(&self, is_resume: bool) -> ServerEvent {
        let config = self.config.lock().await.clone();
        let inner = self.inner.lock().await;
        let seq = self.event_seq.fetch_add(1, Ordering::SeqCst);
        let event = ServerEvent::new(
            self.id,
            seq,
            ServerEventMsg::ServerHello {
                config,
                is_resume: Some(is_resume),
                busy: Some(self.is_busy()),
                has_pending_ask: Some(inner.has_pending_ask),
                has_pending_approval: Some(inner.has_pending_approval),
            },
        );
        let _ = self.events_tx.send(event.clone());
        drop(inner);
        // The observability pipeline itself is out of scope; this is the
        // inert placeholder status a client sees at handshake time so it
        // never has to special-case "no observability backend configured".
        self.emit(ServerEventMsg::ObservabilityStatus {
            status: serde_json::json!({ "enabled": false }),
        })
        .await;
        event
    }

    /// `sendUserMessage`: discards the message during `busy`.
    pub async fn send_user_message(self: &Arc<Self>, text: String, client_message_id: Option<String>) {
        if self.busy.swap(true, Ordering::SeqCst) {
            // Already busy: undo the swap, this call never owned the turn.
            self.busy.store(true, Ordering::SeqCst);
            self.emit(ServerEventMsg::SessionBusy { busy: true }).await;
            return;
        }

        self.emit(ServerEventMsg::SessionBusy { busy: true }).await;
        self.emit(ServerEventMsg::UserMessage {
            text: text.clone(),
            client_message_id,
        })
        .await;

        let abort = Arc::new(Notify::new());
        *self.cancel.lock().await = Some(abort.clone());

        let this = self.clone();
        tokio::spawn(async move {
            this.run_turn_to_completion(text, abort).await;
        });
    }

    async fn run_turn_to_completion(self: Arc<Self>, text: String, abort: Arc<Notify>) {
        let config = self.config.lock().await.clone();
        let roots = SandboxRoots {
            project_root: None,
            working_directory: config.working_directory.clone(),
            output_directory: config.output_directory.clone(),
            uploads_directory: config.uploads_directory.clone(),
        };

        let (log_tx, mut log_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let (ask_tx, mut ask_rx) = tokio::sync::mpsc::unbounded_channel::<AskRequest>();
        let (approval_tx, mut approval_rx) = tokio::sync::mpsc::unbounded_channel::<ApprovalRequest>();
        let (todos_tx, mut todos_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<TodoItem>>();

        let forwarder = {
            let this = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(line) = log_rx.recv() => this.emit(ServerEventMsg::Log { line }).await,
                        Some(req) = ask_rx.recv() => this.register_ask(req).await,
                        Some(req) = approval_rx.recv() => this.register_approval(req).await,
                        Some(todos) = todos_rx.recv() => {
                            this.inner.lock().await.todos = todos.clone();
                            this.emit(ServerEventMsg::Todos { todos }).await;
                        }
                        else => break,
                    }
                }
            })
        };

        let ctx = ToolContext::new(
            roots,
            abort.clone(),
            0,
            vec![],
            self.approved_commands.clone(),
            self.deny_list.clone(),
            log_tx,
            ask_tx,
            approval_tx,
            todos_tx,
        );

        let observer = EmittingObserver {
            session: self.clone(),
        };

        let mut history = {
            let inner = self.inner.lock().await;
            inner.messages.clone()
        };
        let prior_len = history.len();
        let tool_specs = self.registry.specs();

        let outcome = run_turn(
            self.model.as_ref(),
            &config.model,
            &config.provider_options,
            &self.registry,
            &tool_specs,
            &mut history,
            &text,
            &ctx,
            &observer,
            abort,
            DEFAULT_STEP_BUDGET,
        )
        .await;

        if let Some(recorder) = self.rollout.lock().await.as_ref()
            && let Err(e) = recorder.record_messages(&history[prior_len..]).await
        {
            tracing::warn!(session_id = %self.id, "failed to persist rollout: {e}");
        }

        {
            let mut inner = self.inner.lock().await;
            inner.messages = history;
        }

        match outcome {
            Ok(result) => {
                if !result.text.is_empty() {
                    self.emit(ServerEventMsg::AssistantMessage { text: result.text }).await;
                }
            }
            Err(err) => {
                self.emit(ServerEventMsg::Error {
                    code: err.code(),
                    source: cowork_protocol::ErrorSource::Provider,
                    message: err.to_string(),
                })
                .await;
            }
        }

        self.clear_pending_as_cancelled().await;
        forwarder.abort();
        *self.cancel.lock().await = None;
        self.busy.store(false, Ordering::SeqCst);
        self.emit(ServerEventMsg::SessionBusy { busy: false }).await;
        self.turn_done.notify_waiters();
    }

    async fn register_ask(&self, req: AskRequest) {
        {
            let mut inner = self.inner.lock().await;
            inner.has_pending_ask = true;
        }
        self.pending_replies
            .lock()
            .await
            .insert(req.request_id.clone(), PendingReply::Ask(req.reply));
        self.emit(ServerEventMsg::Ask {
            request_id: req.request_id,
            question: req.question,
            options: req.options,
        })
        .await;
    }

    async fn register_approval(&self, req: ApprovalRequest) {
        {
            let mut inner = self.inner.lock().await;
            inner.has_pending_approval = true;
        }
        self.pending_replies
            .lock()
            .await
            .insert(req.request_id.clone(), PendingReply::Approval(req.reply));
        self.emit(ServerEventMsg::Approval {
            request_id: req.request_id,
            command: req.command,
            dangerous: req.dangerous,
            reason_code: req.reason_code,
        })
        .await;
    }

    /// Resolves an `askUser`/`approveCommand` suspension, routed directly
    /// from the Protocol Router rather than the serialized command path: it
    /// only ever completes a stored oneshot, so it is safe to run
    /// concurrently with the in-flight turn.
    pub async fn resolve_ask(&self, request_id: &str, answer: String) {
        if let Some(PendingReply::Ask(tx)) = self.pending_replies.lock().await.remove(request_id) {
            let _ = tx.send(answer);
            self.inner.lock().await.has_pending_ask = false;
        }
    }

    pub async fn resolve_approval(&self, request_id: &str, approved: bool) {
        if let Some(PendingReply::Approval(tx)) =
            self.pending_replies.lock().await.remove(request_id)
        {
            let _ = tx.send(approved);
            self.inner.lock().await.has_pending_approval = false;
        }
    }

    async fn clear_pending_as_cancelled(&self) {
        let mut pending = self.pending_replies.lock().await;
        for (_, reply) in pending.drain() {
            match reply {
                PendingReply::Ask(tx) => drop(tx),
                PendingReply::Approval(tx) => drop(tx),
            }
        }
        let mut inner = self.inner.lock().await;
        inner.has_pending_ask = false;
        inner.has_pending_approval = false;
    }

    /// `reset`: cancels any in-flight turn and waits for it to drain before
    /// clearing state.
    pub async fn reset(self: &Arc<Self>) {
        if let Some(abort) = self.cancel.lock().await.clone() {
            let done = self.turn_done.notified();
            abort.notify_waiters();
            done.await;
        }

        {
            let mut inner = self.inner.lock().await;
            inner.messages.clear();
            inner.todos.clear();
            inner.has_pending_ask = false;
            inner.has_pending_approval = false;
        }
        self.emit(ServerEventMsg::ResetDone).await;
    }

    /// `setModel`: rejected outright during `busy`, surfaced as
    /// `session_busy` like any other mutating request, rather than queued
    /// for the next turn (see DESIGN.md for why).
    pub async fn set_model(&self, provider: Option<String>, model: Option<String>) {
        if self.is_busy() {
            self.emit(ServerEventMsg::SessionBusy { busy: true }).await;
            return;
        }

        let mut config = self.config.lock().await;
        if let Some(provider) = provider {
            let default_model = built_in_model_providers()
                .get(&provider)
                .map(|p| p.default_model.clone());
            config.provider = provider;
            config.model = model.or(default_model).unwrap_or(config.model.clone());
        } else if let Some(model) = model {
            config.model = model;
        }
        let snapshot = config.clone();
        drop(config);
        self.emit(ServerEventMsg::ConfigUpdated { config: snapshot }).await;
    }

    /// `close`: cancels any in-flight turn, transitions to `closed`,
    /// releases all waiters.
    pub async fn close(self: &Arc<Self>) {
        if let Some(abort) = self.cancel.lock().await.clone() {
            let done = self.turn_done.notified();
            abort.notify_waiters();
            done.await;
        }
        self.inner.lock().await.status = SessionStatus::Closed;
        self.clear_pending_as_cancelled().await;
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status
    }

    pub async fn config_snapshot(&self) -> SessionConfig {
        self.config.lock().await.clone()
    }

    pub async fn messages_snapshot(&self) -> Vec<Message> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn todos_snapshot(&self) -> Vec<TodoItem> {
        self.inner.lock().await.todos.clone()
    }

    /// Rehydrates state after a `resume`. `last_event_seq` is the
    /// high-water mark recorded the last time this session was persisted;
    /// restoring it keeps `eventSeq` strictly increasing across the resume
    /// boundary instead of silently restarting at 0.
    pub async fn rehydrate(
        &self,
        messages: Vec<Message>,
        todos: Vec<TodoItem>,
        status: SessionStatus,
        last_event_seq: u64,
    ) {
        let mut inner = self.inner.lock().await;
        inner.messages = messages;
        inner.todos = todos;
        inner.status = status;
        drop(inner);
        self.event_seq.fetch_max(last_event_seq, Ordering::SeqCst);
    }
}

struct EmittingObserver {
    session: Arc<Session>,
}

impl TurnObserver for EmittingObserver {
    fn on_reasoning(&self, kind: ReasoningKind, text: &str) {
        let session = self.session.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            session
                .emit(ServerEventMsg::Reasoning { kind, text })
                .await;
        });
    }

    fn on_assistant_text(&self, _text: &str) {
        // Full text is emitted once the turn completes (see
        // `run_turn_to_completion`); streaming deltas are not surfaced
        // individually to keep event ordering simple for clients.
    }

    fn on_repair_log(&self, line: &str) {
        let session = self.session.clone();
        let line = line.to_string();
        tokio::spawn(async move {
            session.emit(ServerEventMsg::Log { line }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::ScriptedModel;
    use crate::provider::StreamEvent;
    use crate::tools::memory::MemoryTool;
    use crate::tools::skill::SkillTool;

    fn test_config(dir: &std::path::Path) -> SessionConfig {
        SessionConfig {
            provider: "google".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            sub_agent_model: None,
            working_directory: dir.to_path_buf(),
            output_directory: None,
            uploads_directory: None,
            enabled_capabilities: vec![],
            provider_options: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn user_message_during_busy_is_discarded() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let model = Arc::new(ScriptedModel::new(vec![vec![
            StreamEvent::TextDelta("hello".to_string()),
            StreamEvent::StepEnd { more: false },
        ]]));
        let registry = ToolRegistry::full(
            SkillTool { skill_roots: vec![] },
            MemoryTool {
                memory_root: tmp.path().join("memory"),
            },
            model.clone(),
            "gemini-3-flash-preview".to_string(),
            None,
        );
        let session = Session::new(Uuid::new_v4(), test_config(tmp.path()), registry, model);

        let mut events = session.subscribe();
        session
            .send_user_message("hi".to_string(), None)
            .await;
        assert!(session.is_busy());
        session
            .send_user_message("again".to_string(), None)
            .await;

        // Drain a few events; the second user_message must not appear.
        let mut saw_second = false;
        for _ in 0..8 {
            if let Ok(event) = tokio::time::timeout(std::time::Duration::from_millis(200), events.recv()).await
                && let Ok(ServerEvent { msg: ServerEventMsg::UserMessage { text, .. }, .. }) = event
            {
                if text == "again" {
                    saw_second = true;
                }
            }
        }
        assert!(!saw_second);
    }

    #[tokio::test]
    async fn event_seq_is_strictly_increasing_per_session() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let model = Arc::new(ScriptedModel::new(vec![]));
        let registry = ToolRegistry::full(
            SkillTool { skill_roots: vec![] },
            MemoryTool {
                memory_root: tmp.path().join("memory"),
            },
            model.clone(),
            "gemini-3-flash-preview".to_string(),
            None,
        );
        let session = Session::new(Uuid::new_v4(), test_config(tmp.path()), registry, model);

        let mut events = session.subscribe();
        let hello = session.server_hello(false).await;
        session.set_model(None, Some("gemini-2.5-pro".to_string())).await;
        session.reset().await;

        let first = tokio::time::timeout(std::time::Duration::from_millis(200), events.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(first.event_seq, hello.event_seq);

        // server_hello also emits observability_status, then set_model emits
        // config_updated, then reset emits reset_done.
        let mut last_seq = first.event_seq;
        for _ in 0..3 {
            let event = tokio::time::timeout(std::time::Duration::from_millis(200), events.recv())
                .await
                .expect("timed out")
                .expect("channel open");
            assert!(event.event_seq > last_seq, "eventSeq must strictly increase");
            last_seq = event.event_seq;
        }
    }
}
