//! Client → server wire messages.

use uuid::Uuid;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
#[non_exhaustive]
pub enum ClientMessage {
    ClientHello {
        client: String,
        version: String,
    },
    SessionOpen {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_id: Option<Uuid>,
    },
    SessionClose {
        session_id: Uuid,
    },
    UserMessage {
        session_id: Uuid,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        client_message_id: Option<String>,
    },
    Reset {
        session_id: Uuid,
    },
    SetModel {
        session_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        provider: Option<String>,
        model: String,
    },
    AskResponse {
        session_id: Uuid,
        request_id: String,
        answer: String,
    },
    ApprovalResponse {
        session_id: Uuid,
        request_id: String,
        approved: bool,
    },
    ListTools {
        session_id: Uuid,
    },
    ListSessions {
        session_id: Uuid,
    },
    ProviderAuthSetApiKey {
        session_id: Uuid,
        provider: String,
        method_id: String,
        api_key: String,
    },
    ProviderAuthAuthorize {
        session_id: Uuid,
        provider: String,
        method_id: String,
    },
    ProviderAuthCallback {
        session_id: Uuid,
        provider: String,
        method_id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        code: Option<String>,
    },
    ProviderCatalogGet,
    ProviderAuthMethodsGet,
    RefreshProviderStatus,
    HarnessContextGet {
        session_id: Uuid,
    },
    HarnessContextSet {
        session_id: Uuid,
        context: serde_json::Value,
    },
    HarnessSloEvaluate {
        session_id: Uuid,
    },
    ObservabilityQuery {
        session_id: Uuid,
        query: serde_json::Value,
    },
}

impl ClientMessage {
    /// The session this message targets, if any. `client_hello` and the
    /// handful of catalog/informational messages have no session.
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            ClientMessage::ClientHello { .. }
            | ClientMessage::ProviderCatalogGet
            | ClientMessage::ProviderAuthMethodsGet
            | ClientMessage::RefreshProviderStatus => None,
            ClientMessage::SessionOpen { session_id } => *session_id,
            ClientMessage::SessionClose { session_id }
            | ClientMessage::UserMessage { session_id, .. }
            | ClientMessage::Reset { session_id }
            | ClientMessage::SetModel { session_id, .. }
            | ClientMessage::AskResponse { session_id, .. }
            | ClientMessage::ApprovalResponse { session_id, .. }
            | ClientMessage::ListTools { session_id }
            | ClientMessage::ListSessions { session_id }
            | ClientMessage::ProviderAuthSetApiKey { session_id, .. }
            | ClientMessage::ProviderAuthAuthorize { session_id, .. }
            | ClientMessage::ProviderAuthCallback { session_id, .. }
            | ClientMessage::HarnessContextGet { session_id }
            | ClientMessage::HarnessContextSet { session_id, .. }
            | ClientMessage::HarnessSloEvaluate { session_id }
            | ClientMessage::ObservabilityQuery { session_id, .. } => Some(*session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_user_message() {
        let json = serde_json::json!({
            "type": "user_message",
            "sessionId": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "text": "hi",
        });
        let msg: ClientMessage = serde_json::from_value(json).unwrap();
        match &msg {
            ClientMessage::UserMessage { text, .. } => assert_eq!(text, "hi"),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(msg.session_id().is_some());
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let json = serde_json::json!({"type": "not_a_real_type"});
        assert!(serde_json::from_value::<ClientMessage>(json).is_err());
    }
}
