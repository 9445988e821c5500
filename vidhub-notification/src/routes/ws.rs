use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use vidhub_shared::types::auth::AuthUser;

use crate::AppState;

/// GET /ws/notifications
/// Anonymous callers are rejected before the upgrade, so they never reach
/// the presence registry.
pub async fn notifications_socket(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state, auth_user))
}

async fn run_session(mut socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let mut session = state.new_session();
    let mut mailbox = match session.open(Some(&user)).await {
        Ok(mailbox) => mailbox,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "refusing notification socket");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = mailbox.recv() => {
                let Some(event) = event else { break };
                let frame = match session.render(event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(handle = %session.handle(), error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => session.handle_client_message(&text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(handle = %session.handle(), error = %e, "socket read failed");
                    break;
                }
            },
        }
    }

    session.close().await;
}
