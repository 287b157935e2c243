//! WebSocket endpoint for the live stock feed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{bearer_token, verify_bearer};
use crate::errors::ServiceError;
use crate::services::stock_feed::ClientMessage;
use crate::AppState;

pub fn stock_feed_routes() -> Router<AppState> {
    Router::new().route("/stock", get(stock_feed_ws))
}

#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    token: Option<String>,
}

/// GET /ws/stock, upgraded to a WebSocket.
///
/// The bearer credential (Authorization header or `token` query parameter)
/// is verified against the token store before the upgrade; a bad or revoked
/// credential closes the handshake with 401.
async fn stock_feed_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ServiceError> {
    let token = match headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(header) => bearer_token(header)?.to_string(),
        None => query
            .token
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?,
    };

    let user_id = verify_bearer(&state.db, &state.token_verifier, &token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound = state.stock_feed.register(user_id);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        let Ok(json) = serde_json::to_string(&frame) else { continue };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::PrivateMessage { recipient_id, message }) => {
                                state.stock_feed.send_private(user_id, recipient_id, message);
                            }
                            Err(e) => {
                                debug!(user_id = %user_id, "Ignoring malformed client frame: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user_id = %user_id, "Stock feed socket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user_id = %user_id, "Stock feed socket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = sink.close().await;
    state.stock_feed.unregister(user_id);
}
