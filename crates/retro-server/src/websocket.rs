//! WebSocket session handling.
//!
//! Each connection runs two tasks. The read loop decodes envelopes and hands
//! them to the dispatcher; the write loop drains the session's outbound queue
//! and keeps the connection alive with pings. When either ends the other is
//! aborted and the session is unregistered from the hub.

use crate::state::AppState;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use retro_core::{
    Dispatcher, Metrics, Outbound, RetroError, SessionHandle, SessionInfo, encode, run_blocking,
};
use retro_types::{Envelope, ServerMessage};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

/// Replies meant for the sending session only (validation errors).
const REPLY_QUEUE_CAPACITY: usize = 16;

/// Timing and size limits for one connection.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_message_size: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl Limits {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_message_size: config.max_message_size,
            pong_wait: config.pong_wait(),
            ping_period: config.ping_period(),
            write_wait: config.write_wait(),
        }
    }
}

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Closed,
    IdleTimeout,
    TransportError,
    ProtocolViolation,
}

/// Why the write loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEnd {
    /// The hub closed the outbound queue.
    QueueClosed,
    TransportError,
    Timeout,
}

pub async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    board_id: String,
    admin_key: Option<String>,
) -> Result<()> {
    let id = board_id.clone();
    let board = match run_blocking(&state.store, move |store| store.get(&id)).await {
        Ok(board) => board,
        Err(RetroError::BoardNotFound(_)) => {
            info!(target: "retro::ws", "Rejecting connection to unknown board {}", board_id);
            return reject(socket, "Board not found").await;
        }
        Err(e) => {
            error!(target: "retro::ws", "Failed to load board {}: {}", board_id, e);
            return reject(socket, "Board not found").await;
        }
    };

    let is_admin = admin_key.is_some_and(|key| board.is_admin_key(&key));
    let info = Arc::new(SessionInfo::new(board_id, is_admin));
    let span = info_span!(
        target: "retro::ws",
        "session",
        board_id = %info.board_id,
        participant_id = %info.participant_id,
    );

    run_session(socket, state, info).instrument(span).await;
    Ok(())
}

async fn reject(mut socket: WebSocket, message: &str) -> Result<()> {
    let frame = encode(&ServerMessage::error(message))?;
    socket.send(Message::Text(frame.to_string().into())).await?;
    socket.send(Message::Close(None)).await?;
    Ok(())
}

async fn run_session(socket: WebSocket, state: Arc<AppState>, info: Arc<SessionInfo>) {
    let limits = Limits::from_config(&state.config);
    let (handle, outbound_rx) = SessionHandle::new(info.clone(), state.config.outbound_queue_capacity);
    let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_CAPACITY);

    if let Err(e) = state.hub.register(handle).await {
        error!(target: "retro::ws", "Failed to register session: {}", e);
        return;
    }
    state.metrics.connection_opened();
    info!(target: "retro::ws", "Session connected (admin: {})", info.is_admin);

    let (ws_tx, ws_rx) = socket.split();

    let mut send_task = tokio::spawn(write_loop(ws_tx, outbound_rx, reply_rx, limits).in_current_span());
    let mut recv_task = tokio::spawn(
        read_loop(
            ws_rx,
            state.dispatcher.clone(),
            info.clone(),
            reply_tx,
            state.metrics.clone(),
            limits,
        )
        .in_current_span(),
    );

    tokio::select! {
        end = &mut send_task => {
            recv_task.abort();
            debug!(target: "retro::ws", "Write loop ended: {:?}", end);
        }
        end = &mut recv_task => {
            send_task.abort();
            debug!(target: "retro::ws", "Read loop ended: {:?}", end);
        }
    }

    if let Err(e) = state.hub.unregister(&info).await {
        warn!(target: "retro::ws", "Failed to unregister session: {}", e);
    }
    state.metrics.connection_closed();
    info!(target: "retro::ws", "Session disconnected");
}

/// Join the first message with whatever else is already queued, one per line.
fn coalesce(first: Outbound, queue: &mut mpsc::Receiver<Outbound>) -> String {
    let mut frame = String::from(&*first);
    for _ in 0..queue.len() {
        match queue.try_recv() {
            Ok(next) => {
                frame.push('\n');
                frame.push_str(&next);
            }
            Err(_) => break,
        }
    }
    frame
}

pub async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    mut replies: mpsc::Receiver<Outbound>,
    limits: Limits,
) -> WriteEnd
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + limits.ping_period, limits.ping_period);
    let mut wrote_since_tick = false;

    loop {
        let frame = tokio::select! {
            queued = outbound.recv() => match queued {
                Some(first) => Message::Text(coalesce(first, &mut outbound).into()),
                None => {
                    let _ = timeout(limits.write_wait, sink.send(Message::Close(None))).await;
                    return WriteEnd::QueueClosed;
                }
            },
            Some(reply) = replies.recv() => Message::Text(reply.to_string().into()),
            _ = ticker.tick() => {
                if std::mem::take(&mut wrote_since_tick) {
                    continue;
                }
                trace!(target: "retro::ws::ping", "Sending ping");
                Message::Ping(Bytes::new())
            }
        };

        let is_ping = matches!(frame, Message::Ping(_));
        match timeout(limits.write_wait, sink.send(frame)).await {
            Ok(Ok(())) => wrote_since_tick |= !is_ping,
            Ok(Err(e)) => {
                debug!(target: "retro::ws", "Write failed: {}", e);
                return WriteEnd::TransportError;
            }
            Err(_) => {
                warn!(target: "retro::ws", "Write timed out after {:?}", limits.write_wait);
                return WriteEnd::Timeout;
            }
        }
    }
}

pub async fn read_loop<R, E>(
    mut stream: R,
    dispatcher: Arc<Dispatcher>,
    info: Arc<SessionInfo>,
    replies: mpsc::Sender<Outbound>,
    metrics: Arc<Metrics>,
    limits: Limits,
) -> ReadEnd
where
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let msg = match timeout(limits.pong_wait, stream.next()).await {
            Err(_) => {
                info!(target: "retro::ws", "No traffic for {:?}, closing", limits.pong_wait);
                return ReadEnd::IdleTimeout;
            }
            Ok(None) => return ReadEnd::Closed,
            Ok(Some(Err(e))) => {
                debug!(target: "retro::ws", "Read failed: {}", e);
                return ReadEnd::TransportError;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => {
                if text.len() > limits.max_message_size {
                    warn!(target: "retro::ws", "Message of {} bytes exceeds limit, closing", text.len());
                    return ReadEnd::ProtocolViolation;
                }
                metrics.message_processed();

                let envelope = match Envelope::parse(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(target: "retro::ws", "Malformed envelope, closing: {}", e);
                        metrics.message_error();
                        return ReadEnd::ProtocolViolation;
                    }
                };

                let Some(reply) = dispatcher.handle_envelope(&info, envelope).await else {
                    continue;
                };
                match encode(&reply) {
                    Ok(frame) => {
                        if replies.try_send(frame).is_err() {
                            warn!(target: "retro::ws", "Reply queue full, dropping {}", reply.type_name());
                        }
                    }
                    Err(e) => error!(target: "retro::ws", "Failed to encode reply: {}", e),
                }
            }
            Message::Binary(_) => {
                warn!(target: "retro::ws", "Binary frames are not supported, closing");
                return ReadEnd::ProtocolViolation;
            }
            Message::Pong(_) => trace!(target: "retro::ws::ping", "Pong received"),
            Message::Ping(_) => trace!(target: "retro::ws::ping", "Ping received"),
            Message::Close(_) => return ReadEnd::Closed,
        }
    }
}
