//! End-to-end Protocol Router scenarios: simple greet, approval flow,
//! provider swap between turns.

use std::sync::Arc;
use std::time::Duration;

use cowork_core::config::Config;
use cowork_core::provider::StreamEvent;
use cowork_core::provider::mock::ScriptedModel;
use cowork_core::tools::ToolRegistry;
use cowork_core::tools::memory::MemoryTool;
use cowork_core::tools::skill::SkillTool;
use cowork_protocol::ClientMessage;
use cowork_protocol::ServerEventMsg;
use cowork_server::registry::SessionRegistry;
use cowork_server::router::RouterAction;
use cowork_server::router::route;
use cowork_server::store::JsonFileSessionStore;

fn test_registry(tmp: &std::path::Path, model: Arc<ScriptedModel>) -> Arc<SessionRegistry> {
    let store = Arc::new(JsonFileSessionStore::new(tmp.join("sessions")));
    let tools = ToolRegistry::full(
        SkillTool { skill_roots: vec![] },
        MemoryTool { memory_root: tmp.join("memory") },
        model.clone(),
        "gemini-3-flash-preview".to_string(),
        None,
    );
    let mut config = Config::default();
    config.cowork_home = tmp.to_path_buf();
    SessionRegistry::new(config, store, tools, model)
}

async fn recv_until(
    events: &mut tokio::sync::broadcast::Receiver<cowork_protocol::ServerEvent>,
    mut pred: impl FnMut(&ServerEventMsg) -> bool,
) -> ServerEventMsg {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast channel closed");
        if pred(&event.msg) {
            return event.msg;
        }
    }
}

/// A simple greet-and-reply round trip: hello, one user message, one
/// assistant reply.
#[tokio::test]
async fn simple_greet() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new(vec![vec![
        StreamEvent::TextDelta("hello".to_string()),
        StreamEvent::StepEnd { more: false },
    ]]));
    let registry = test_registry(tmp.path(), model);

    let (action, reply) = route(
        &registry,
        ClientMessage::ClientHello {
            client: "tui".to_string(),
            version: "0.1.0".to_string(),
        },
    )
    .await;
    let session_id = match action {
        RouterAction::Subscribe(id) => id,
        _ => panic!("client_hello must subscribe"),
    };
    assert!(matches!(reply.unwrap().msg, ServerEventMsg::ServerHello { .. }));

    let session = registry.get(session_id).await.expect("session exists");
    let mut events = session.subscribe();

    let (_, reply) = route(
        &registry,
        ClientMessage::UserMessage {
            session_id,
            text: "hi".to_string(),
            client_message_id: None,
        },
    )
    .await;
    assert!(reply.is_none());

    assert!(matches!(
        recv_until(&mut events, |m| matches!(m, ServerEventMsg::SessionBusy { busy: true })).await,
        ServerEventMsg::SessionBusy { busy: true }
    ));
    match recv_until(&mut events, |m| matches!(m, ServerEventMsg::AssistantMessage { .. })).await {
        ServerEventMsg::AssistantMessage { text } => assert_eq!(text, "hello"),
        _ => unreachable!(),
    }
    assert!(matches!(
        recv_until(&mut events, |m| matches!(m, ServerEventMsg::SessionBusy { busy: false })).await,
        ServerEventMsg::SessionBusy { busy: false }
    ));
}

/// A provider swap between turns: `set_model` while idle is accepted and
/// reflected in `config_updated`.
#[tokio::test]
async fn set_model_between_turns_is_accepted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new(vec![vec![StreamEvent::StepEnd { more: false }]]));
    let registry = test_registry(tmp.path(), model);

    let (action, _) = route(
        &registry,
        ClientMessage::ClientHello {
            client: "tui".to_string(),
            version: "0.1.0".to_string(),
        },
    )
    .await;
    let session_id = match action {
        RouterAction::Subscribe(id) => id,
        _ => panic!("client_hello must subscribe"),
    };
    let session = registry.get(session_id).await.expect("session exists");
    let mut events = session.subscribe();

    let (_, reply) = route(
        &registry,
        ClientMessage::SetModel {
            session_id,
            provider: Some("anthropic".to_string()),
            model: "claude-opus-4-6".to_string(),
        },
    )
    .await;
    assert!(reply.is_none(), "set_model's reply travels over the broadcast channel, not as a direct reply");

    match recv_until(&mut events, |m| matches!(m, ServerEventMsg::ConfigUpdated { .. })).await {
        ServerEventMsg::ConfigUpdated { config } => {
            assert_eq!(config.provider, "anthropic");
            assert_eq!(config.model, "claude-opus-4-6");
        }
        _ => unreachable!(),
    }
}

/// A `user_message` sent while busy is rejected with `session_busy` and
/// never reaches the transcript.
#[tokio::test]
async fn user_message_while_busy_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new(vec![vec![
        StreamEvent::TextDelta("hello".to_string()),
        StreamEvent::StepEnd { more: false },
    ]]));
    let registry = test_registry(tmp.path(), model);

    let (action, _) = route(
        &registry,
        ClientMessage::ClientHello {
            client: "tui".to_string(),
            version: "0.1.0".to_string(),
        },
    )
    .await;
    let session_id = match action {
        RouterAction::Subscribe(id) => id,
        _ => panic!("client_hello must subscribe"),
    };
    let session = registry.get(session_id).await.expect("session exists");
    let mut events = session.subscribe();

    route(
        &registry,
        ClientMessage::UserMessage { session_id, text: "first".to_string(), client_message_id: None },
    )
    .await;
    assert!(session.is_busy());

    route(
        &registry,
        ClientMessage::UserMessage { session_id, text: "second".to_string(), client_message_id: None },
    )
    .await;

    let mut saw_second_text = false;
    for _ in 0..10 {
        let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await else {
            break;
        };
        if let ServerEventMsg::UserMessage { text, .. } = event.msg
            && text == "second"
        {
            saw_second_text = true;
        }
    }
    assert!(!saw_second_text);
}
