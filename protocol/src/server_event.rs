//! Server → client wire events.
//!
//! Every event is wrapped in [`ServerEvent`], which carries the `sessionId`
//! and `eventSeq` common to all events. `eventSeq` is strictly increasing
//! per session.

use uuid::Uuid;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorCode;
use crate::error::ErrorSource;
use crate::session::ReasoningKind;
use crate::session::SessionConfig;
use crate::session::TodoItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub session_id: Uuid,
    pub event_seq: u64,
    #[serde(flatten)]
    pub msg: ServerEventMsg,
}

impl ServerEvent {
    pub fn new(session_id: Uuid, event_seq: u64, msg: ServerEventMsg) -> Self {
        Self {
            session_id,
            event_seq,
            msg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
#[non_exhaustive]
pub enum ServerEventMsg {
    ServerHello {
        config: SessionConfig,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        is_resume: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        busy: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        has_pending_ask: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        has_pending_approval: Option<bool>,
    },
    SessionBusy {
        busy: bool,
    },
    UserMessage {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        client_message_id: Option<String>,
    },
    AssistantMessage {
        text: String,
    },
    Reasoning {
        kind: ReasoningKind,
        text: String,
    },
    Log {
        line: String,
    },
    Todos {
        todos: Vec<TodoItem>,
    },
    Ask {
        request_id: String,
        question: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        options: Option<Vec<String>>,
    },
    Approval {
        request_id: String,
        command: String,
        dangerous: bool,
        reason_code: String,
    },
    ResetDone,
    ConfigUpdated {
        config: SessionConfig,
    },
    ToolsList {
        tools: serde_json::Value,
    },
    SessionsList {
        sessions: serde_json::Value,
    },
    ProviderCatalog {
        providers: serde_json::Value,
    },
    ProviderAuthMethods {
        methods: serde_json::Value,
    },
    ProviderStatus {
        status: serde_json::Value,
    },
    ProviderAuthChallenge {
        challenge: serde_json::Value,
    },
    ProviderAuthResult {
        result: serde_json::Value,
    },
    ObservabilityStatus {
        status: serde_json::Value,
    },
    HarnessContext {
        context: serde_json::Value,
    },
    ObservabilityQueryResult {
        result: serde_json::Value,
    },
    HarnessSloResult {
        result: serde_json::Value,
    },
    Error {
        code: ErrorCode,
        source: ErrorSource,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_seq_is_carried_at_top_level() {
        let event = ServerEvent::new(
            Uuid::nil(),
            7,
            ServerEventMsg::SessionBusy { busy: true },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventSeq"], 7);
        assert_eq!(json["type"], "session_busy");
        assert_eq!(json["busy"], true);
    }
}
