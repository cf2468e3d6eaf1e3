//! WebSocket transport for the Protocol Router. One connection may have
//! several sessions open at once; each gets its own forwarding task that
//! drains its broadcast receiver into a connection-wide outbound queue.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use cowork_protocol::ClientMessage;
use cowork_protocol::ErrorCode;
use cowork_protocol::ErrorSource;
use cowork_protocol::ServerEvent;
use cowork_protocol::ServerEventMsg;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::registry::SessionRegistry;
use crate::router::RouterAction;
use crate::router::route;

pub async fn ws_handler(ws: WebSocketUpgrade, State(registry): State<Arc<SessionRegistry>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(mut socket: WebSocket, registry: Arc<SessionRegistry>) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut forwarders: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&registry, &text, &out_tx, &mut forwarders).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("websocket recv error: {e}");
                        break;
                    }
                }
            }
            Some(event) = out_rx.recv() => {
                send_event(&mut socket, &event).await;
            }
        }
    }

    for handle in forwarders.into_values() {
        handle.abort();
    }
    debug!("websocket connection closed");
}

async fn handle_frame(
    registry: &Arc<SessionRegistry>,
    text: &str,
    out_tx: &mpsc::UnboundedSender<ServerEvent>,
    forwarders: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let _ = out_tx.send(ServerEvent::new(
                Uuid::nil(),
                0,
                ServerEventMsg::Error {
                    code: ErrorCode::InvalidJson,
                    source: ErrorSource::Protocol,
                    message: e.to_string(),
                },
            ));
            return;
        }
    };

    let (action, reply) = route(registry, msg).await;
    if let Some(reply) = reply {
        let _ = out_tx.send(reply);
    }

    match action {
        RouterAction::Subscribe(session_id) => {
            if forwarders.contains_key(&session_id) {
                return;
            }
            if let Some(session) = registry.get(session_id).await {
                let mut events = session.subscribe();
                let out_tx = out_tx.clone();
                let handle = tokio::spawn(async move {
                    loop {
                        match events.recv().await {
                            Ok(event) => {
                                if out_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                warn!(session_id = %session_id, "client lagged by {n} events");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
                forwarders.insert(session_id, handle);
            }
        }
        RouterAction::Unsubscribe(session_id) => {
            if let Some(handle) = forwarders.remove(&session_id) {
                handle.abort();
            }
        }
        RouterAction::None => {}
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) {
    if let Ok(json) = serde_json::to_string(event)
        && socket.send(Message::Text(json.into())).await.is_err()
    {
        debug!("failed to send event to client, connection likely closed");
    }
}
