//! Protocol Router: decodes inbound client messages, routes them into the
//! right session, and returns whatever direct reply (if any) that message
//! warrants. Per-session events reach clients separately, through the
//! session's own broadcast channel (subscribed to in `ws.rs`).

use std::sync::Arc;

use cowork_core::provider::built_in_model_providers;
use cowork_protocol::ClientMessage;
use cowork_protocol::ErrorCode;
use cowork_protocol::ErrorSource;
use cowork_protocol::ServerEvent;
use cowork_protocol::ServerEventMsg;
use uuid::Uuid;

use crate::registry::SessionRegistry;

/// What the websocket loop must additionally do after routing a message.
pub enum RouterAction {
    None,
    Subscribe(Uuid),
    Unsubscribe(Uuid),
}

/// Session id sentinel for replies to messages that don't target a session
/// (`provider_catalog_get` and friends). The wire envelope requires a
/// `sessionId` on every event; there is no session yet to carry one.
const NO_SESSION: Uuid = Uuid::nil();

pub async fn route(registry: &Arc<SessionRegistry>, msg: ClientMessage) -> (RouterAction, Option<ServerEvent>) {
    match msg {
        ClientMessage::ClientHello { .. } => {
            let session = registry.create(None).await;
            let event = session.server_hello(false).await;
            (RouterAction::Subscribe(session.id), Some(event))
        }
        ClientMessage::SessionOpen { session_id } => match session_id {
            Some(id) => match registry.open(id).await {
                Ok((session, is_resume)) => {
                    let event = session.server_hello(is_resume).await;
                    (RouterAction::Subscribe(session.id), Some(event))
                }
                Err(e) => (RouterAction::None, Some(error_event(NO_SESSION, ErrorCode::InternalError, ErrorSource::Session, e.to_string()))),
            },
            None => {
                let session = registry.create(None).await;
                let event = session.server_hello(false).await;
                (RouterAction::Subscribe(session.id), Some(event))
            }
        },
        ClientMessage::SessionClose { session_id } => {
            let _ = registry.close(session_id).await;
            (RouterAction::Unsubscribe(session_id), None)
        }
        ClientMessage::UserMessage { session_id, text, client_message_id } => {
            with_session(registry, session_id, |session| async move {
                session.send_user_message(text, client_message_id).await;
                None
            })
            .await
        }
        ClientMessage::Reset { session_id } => {
            with_session(registry, session_id, |session| async move {
                session.reset().await;
                None
            })
            .await
        }
        ClientMessage::SetModel { session_id, provider, model } => {
            with_session(registry, session_id, |session| async move {
                session.set_model(provider, Some(model)).await;
                None
            })
            .await
        }
        ClientMessage::AskResponse { session_id, request_id, answer } => {
            with_session(registry, session_id, |session| async move {
                session.resolve_ask(&request_id, answer).await;
                None
            })
            .await
        }
        ClientMessage::ApprovalResponse { session_id, request_id, approved } => {
            with_session(registry, session_id, |session| async move {
                session.resolve_approval(&request_id, approved).await;
                None
            })
            .await
        }
        ClientMessage::ListTools { session_id } => {
            with_session(registry, session_id, |session| async move {
                let tools = serde_json::to_value(session.tool_specs()).unwrap_or(serde_json::Value::Null);
                Some(ServerEventMsg::ToolsList { tools })
            })
            .await
        }
        ClientMessage::ListSessions { session_id } => {
            let records = match registry.list().await {
                Ok(records) => records,
                Err(e) => return (RouterAction::None, Some(error_event(session_id, ErrorCode::InternalError, ErrorSource::Session, e.to_string()))),
            };
            let summaries: Vec<_> = records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "sessionId": r.session_id,
                        "title": r.title,
                        "status": r.status,
                        "provider": r.provider,
                        "model": r.model,
                        "messageCount": r.message_count,
                    })
                })
                .collect();
            let msg = ServerEventMsg::SessionsList {
                sessions: serde_json::Value::Array(summaries),
            };
            with_session(registry, session_id, |_| async move { Some(msg) }).await
        }
        ClientMessage::ProviderCatalogGet => {
            let providers = serde_json::to_value(built_in_model_providers()).unwrap_or(serde_json::Value::Null);
            (RouterAction::None, Some(ServerEvent::new(NO_SESSION, 0, ServerEventMsg::ProviderCatalog { providers })))
        }
        ClientMessage::ProviderAuthMethodsGet => (
            RouterAction::None,
            Some(ServerEvent::new(
                NO_SESSION,
                0,
                ServerEventMsg::ProviderAuthMethods {
                    methods: serde_json::json!({ "api_key": built_in_model_providers().keys().cloned().collect::<Vec<_>>() }),
                },
            )),
        ),
        ClientMessage::RefreshProviderStatus => (
            RouterAction::None,
            Some(ServerEvent::new(
                NO_SESSION,
                0,
                ServerEventMsg::ProviderStatus {
                    status: serde_json::json!({}),
                },
            )),
        ),
        ClientMessage::ProviderAuthSetApiKey { session_id, provider, .. } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::ProviderAuthResult {
                    result: serde_json::json!({ "provider": provider, "accepted": true }),
                })
            })
            .await
        }
        ClientMessage::ProviderAuthAuthorize { session_id, provider, method_id } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::ProviderAuthChallenge {
                    challenge: serde_json::json!({ "provider": provider, "methodId": method_id }),
                })
            })
            .await
        }
        ClientMessage::ProviderAuthCallback { session_id, provider, .. } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::ProviderAuthResult {
                    result: serde_json::json!({ "provider": provider, "accepted": true }),
                })
            })
            .await
        }
        ClientMessage::HarnessContextGet { session_id } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::HarnessContext { context: serde_json::json!({}) })
            })
            .await
        }
        ClientMessage::HarnessContextSet { session_id, context } => {
            with_session(registry, session_id, |_| async move { Some(ServerEventMsg::HarnessContext { context }) }).await
        }
        ClientMessage::HarnessSloEvaluate { session_id } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::HarnessSloResult {
                    result: serde_json::json!({}),
                })
            })
            .await
        }
        ClientMessage::ObservabilityQuery { session_id, query } => {
            with_session(registry, session_id, |_| async move {
                Some(ServerEventMsg::ObservabilityQueryResult {
                    result: serde_json::json!({ "query": query, "results": [] }),
                })
            })
            .await
        }
    }
}

async fn with_session<F, Fut>(registry: &Arc<SessionRegistry>, session_id: Uuid, f: F) -> (RouterAction, Option<ServerEvent>)
where
    F: FnOnce(Arc<cowork_core::Session>) -> Fut,
    Fut: std::future::Future<Output = Option<ServerEventMsg>>,
{
    match registry.get(session_id).await {
        Some(session) => {
            let msg = f(session.clone()).await;
            let reply = match msg {
                Some(msg) => Some(session.direct_reply(msg).await),
                None => None,
            };
            (RouterAction::None, reply)
        }
        None => (
            RouterAction::None,
            Some(error_event(
                session_id,
                ErrorCode::ValidationFailed,
                ErrorSource::Protocol,
                format!("no session with id: {session_id}"),
            )),
        ),
    }
}

fn error_event(session_id: Uuid, code: ErrorCode, source: ErrorSource, message: String) -> ServerEvent {
    ServerEvent::new(session_id, 0, ServerEventMsg::Error { code, source, message })
}
