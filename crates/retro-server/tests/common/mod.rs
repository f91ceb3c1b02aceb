//! Shared helpers for the server integration tests.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use retro_core::{BoardStore, MemoryBoardStore};
use retro_server::{config::Config, routes, state::AppState};
use retro_types::Board;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// App state backed by an in-memory store, plus one seeded board.
pub fn test_state() -> (Arc<AppState>, Board) {
    let store = Arc::new(MemoryBoardStore::default());
    let board = Board::new_seeded();
    store.save(&board).unwrap();
    let state = Arc::new(AppState::with_store(Config::default(), store));
    (state, board)
}

/// Serve the full router on an ephemeral local port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let app = routes::router(state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn ws_url(addr: SocketAddr, board_id: &str, admin_key: Option<&str>) -> String {
    match admin_key {
        Some(key) => format!("ws://{}/ws?boardId={}&adminKey={}", addr, board_id, key),
        None => format!("ws://{}/ws?boardId={}", addr, board_id),
    }
}

/// Test client that understands newline-batched frames.
pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
}

impl Client {
    pub async fn connect(addr: SocketAddr, board_id: &str, admin_key: Option<&str>) -> Self {
        let (ws, _) = connect_async(ws_url(addr, board_id, admin_key)).await.unwrap();
        Self {
            ws,
            pending: VecDeque::new(),
        }
    }

    /// Connect and consume the initial board state.
    pub async fn join(addr: SocketAddr, board_id: &str, admin_key: Option<&str>) -> (Self, Value) {
        let mut client = Self::connect(addr, board_id, admin_key).await;
        let state = client.next_event().await.expect("initial board state");
        assert_eq!(state["type"], "server:board:state_update");
        (client, state)
    }

    pub async fn send(&mut self, kind: &str, payload: Value) {
        let frame = json!({ "type": kind, "payload": payload }).to_string();
        self.ws.send(Message::text(frame)).await.unwrap();
    }

    /// Next application event, or `None` once the server closes the connection.
    pub async fn next_event(&mut self) -> Option<Value> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let frame = tokio::time::timeout(EVENT_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for server frame");
            match frame {
                Some(Ok(Message::Text(text))) => {
                    for line in text.as_str().split('\n') {
                        self.pending.push_back(serde_json::from_str(line).unwrap());
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Assert nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Some(event) = self.pending.pop_front() {
            panic!("unexpected event {}", event);
        }
        match tokio::time::timeout(wait, self.ws.next()).await {
            Err(_) => {}
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame {}", text.as_str()),
            Ok(other) => panic!("unexpected frame {:?}", other),
        }
    }

    /// Drain until the server closes, returning the events seen on the way.
    pub async fn drain_until_closed(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

/// Columns of a state update payload, sorted by their order.
pub fn column_titles(state: &Value) -> Vec<String> {
    let mut columns: Vec<&Value> = state["payload"]["columns"]
        .as_object()
        .unwrap()
        .values()
        .collect();
    columns.sort_by_key(|c| c["order"].as_i64().unwrap());
    columns
        .iter()
        .map(|c| c["title"].as_str().unwrap().to_string())
        .collect()
}
