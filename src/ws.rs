//! Streaming endpoint
//!
//! Each connection registers one subscriber. Snapshots pushed by the
//! broadcast loop arrive on the subscriber's queue and are written to the
//! socket as JSON arrays. The connection ends when the client closes, a
//! socket write fails or exceeds the send timeout, or the registry drops
//! the subscriber.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SendError;
use crate::registry::subscriber_channel;
use crate::state::AppState;
use crate::types::Snapshot;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
struct WsClientMsg {
    #[serde(rename = "type")]
    msg_type: String,
}

type WsSender = SplitSink<WebSocket, Message>;

/// Writes one text frame, giving up after `timeout` so a peer that stopped
/// reading cannot park the connection task.
async fn send_text(
    sender: &mut WsSender,
    payload: String,
    timeout: Duration,
) -> Result<(), axum::Error> {
    match tokio::time::timeout(timeout, sender.send(Message::Text(payload))).await {
        Ok(result) => result,
        Err(_) => Err(axum::Error::new(SendError::TimedOut)),
    }
}

async fn send_snapshot(
    sender: &mut WsSender,
    snapshot: &Snapshot,
    timeout: Duration,
) -> Result<(), axum::Error> {
    let payload = snapshot.to_json().map_err(axum::Error::new)?;
    send_text(sender, payload, timeout).await
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let send_timeout = state.config.send_timeout;

    // Initial push so the client does not wait a full broadcast interval.
    let initial = state.cache.snapshot().await;
    if let Err(e) = send_snapshot(&mut sender, &initial, send_timeout).await {
        tracing::debug!(error = %e, "Initial snapshot write failed");
        return;
    }

    // The registry owns the only sender: once it drops the subscriber,
    // `rx` ends and so does this connection.
    let (tx, mut rx) = subscriber_channel();
    let id = state.registry.register(tx);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(snapshot) => {
                        if let Err(e) = send_snapshot(&mut sender, &snapshot, send_timeout).await {
                            tracing::debug!(subscriber = %id, error = %e, "Socket write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let is_ping = serde_json::from_str::<WsClientMsg>(&text)
                            .map(|msg| msg.msg_type == "ping")
                            .unwrap_or(false);
                        let pong = r#"{"type":"pong"}"#.to_string();
                        if is_ping && send_text(&mut sender, pong, send_timeout).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.unregister(id);
    let _ = tokio::time::timeout(send_timeout, sender.close()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::provider::mock::{coin, coins, MockProvider};
    use crate::routes::app;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
    use tokio_tungstenite::{connect_async, connect_async_with_config, tungstenite};

    async fn serve(state: Arc<AppState>) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        addr
    }

    async fn wait_for_subscribers(state: &AppState, n: usize) {
        for _ in 0..100 {
            if state.registry.len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} subscribers, found {}", state.registry.len());
    }

    fn parse(msg: tungstenite::Message) -> serde_json::Value {
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_pushes_initial_and_broadcast_snapshots() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(20));
        let state = AppState::with_provider(HubConfig::default(), provider.clone());
        let addr = serve(Arc::clone(&state)).await;

        let (mut client, _) = connect_async(format!("ws://{addr}/ws/prices")).await.unwrap();

        let initial = parse(client.next().await.unwrap().unwrap());
        assert_eq!(initial.as_array().unwrap().len(), 20);
        assert_eq!(initial[0]["id"], "coin-1");

        wait_for_subscribers(&state, 1).await;
        state.broadcaster().tick().await;

        let pushed = parse(client.next().await.unwrap().unwrap());
        assert_eq!(pushed, initial);
        assert_eq!(provider.market_calls(), 1);
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(1));
        let state = AppState::with_provider(HubConfig::default(), provider);
        let addr = serve(Arc::clone(&state)).await;

        let (mut client, _) = connect_async(format!("ws://{addr}/ws/prices")).await.unwrap();
        client.next().await.unwrap().unwrap();

        client
            .send(tungstenite::Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();
        let reply = parse(client.next().await.unwrap().unwrap());
        assert_eq!(reply["type"], "pong");
    }

    #[tokio::test]
    async fn test_stalled_reader_is_disconnected() {
        // One snapshot far larger than the loopback socket buffers.
        let mut big = coin("bitcoin", 1.0);
        big.name = "x".repeat(32 << 20);
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(vec![big]);
        let config = HubConfig {
            send_timeout: Duration::from_millis(200),
            ..HubConfig::default()
        };
        let state = AppState::with_provider(config, provider);
        let addr = serve(Arc::clone(&state)).await;

        let ws_config = WebSocketConfig {
            max_message_size: None,
            max_frame_size: None,
            ..WebSocketConfig::default()
        };
        let (mut client, _) =
            connect_async_with_config(format!("ws://{addr}/ws/prices"), Some(ws_config), false)
                .await
                .unwrap();

        // Don't read while the server is writing.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(state.registry.len(), 0);

        // The server gave up on the write, so draining hits the end of the
        // stream instead of waiting for the next broadcast.
        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(Ok(_)) = client.next().await {}
        })
        .await;
        assert!(drained.is_ok(), "server kept the stalled connection open");
        assert_eq!(state.registry.len(), 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_unregisters() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(2));
        let state = AppState::with_provider(HubConfig::default(), provider);
        let addr = serve(Arc::clone(&state)).await;

        let (mut client, _) = connect_async(format!("ws://{addr}/ws/prices")).await.unwrap();
        client.next().await.unwrap().unwrap();
        wait_for_subscribers(&state, 1).await;

        client.close(None).await.unwrap();
        wait_for_subscribers(&state, 0).await;
    }
}
