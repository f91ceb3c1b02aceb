//! WebSocket message protocol between board clients and the server.
//!
//! Every frame in both directions is a JSON object `{"type": ..., "payload": ...}`.
//! Inbound frames are decoded in two steps: the envelope first, then the payload
//! for the specific [`CommandKind`], so that unknown types can be ignored and
//! admin-only types can be gated before any payload work happens.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Board;

/// Raw inbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Every command type a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateTile,
    RevealTile,
    RevealAll,
    VoteTile,
    CreateColumn,
    UpdateColumn,
    DeleteColumn,
    TypingStart,
    TypingStop,
    CreateThread,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::CreateTile,
        CommandKind::RevealTile,
        CommandKind::RevealAll,
        CommandKind::VoteTile,
        CommandKind::CreateColumn,
        CommandKind::UpdateColumn,
        CommandKind::DeleteColumn,
        CommandKind::TypingStart,
        CommandKind::TypingStop,
        CommandKind::CreateThread,
    ];

    /// Look up a wire type string. Unknown types yield `None`.
    pub fn from_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CreateTile => "client:tile:create",
            CommandKind::RevealTile => "client:tile:reveal",
            CommandKind::RevealAll => "client:board:reveal_all",
            CommandKind::VoteTile => "client:tile:vote",
            CommandKind::CreateColumn => "client:column:create",
            CommandKind::UpdateColumn => "client:column:update",
            CommandKind::DeleteColumn => "client:column:delete",
            CommandKind::TypingStart => "client:user:typing_start",
            CommandKind::TypingStop => "client:user:typing_stop",
            CommandKind::CreateThread => "client:thread:create",
        }
    }

    /// Commands only an admin session may run. Others silently ignore them.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            CommandKind::RevealTile
                | CommandKind::RevealAll
                | CommandKind::CreateColumn
                | CommandKind::UpdateColumn
                | CommandKind::DeleteColumn
        )
    }

    /// Client-facing message when the payload cannot be decoded.
    pub fn invalid_payload_message(&self) -> &'static str {
        match self {
            CommandKind::CreateTile => "Invalid tile data",
            CommandKind::RevealTile => "Invalid tile reveal data",
            CommandKind::VoteTile => "Invalid vote data",
            CommandKind::CreateColumn => "Invalid column data",
            CommandKind::UpdateColumn => "Invalid column update data",
            CommandKind::DeleteColumn => "Invalid column delete data",
            CommandKind::CreateThread => "Invalid thread data",
            CommandKind::RevealAll | CommandKind::TypingStart | CommandKind::TypingStop => {
                "Invalid message data"
            }
        }
    }
}

/// Payload of a command type could not be decoded.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PayloadError {
    pub kind: CommandKind,
    pub message: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateTilePayload {
    pub column_id: String,
    pub content: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileRefPayload {
    pub tile_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateColumnPayload {
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateColumnPayload {
    pub column_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteColumnPayload {
    pub column_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateThreadPayload {
    pub tile_id: String,
    pub content: String,
    pub author: Option<String>,
}

/// A decoded client command, one payload shape per type.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CreateTile(CreateTilePayload),
    RevealTile(TileRefPayload),
    RevealAll,
    VoteTile(TileRefPayload),
    CreateColumn(CreateColumnPayload),
    UpdateColumn(UpdateColumnPayload),
    DeleteColumn(DeleteColumnPayload),
    Typing { typing: bool },
    CreateThread(CreateThreadPayload),
}

impl ClientMessage {
    /// Decode the payload for an already identified command type.
    ///
    /// Reveal-all and typing commands carry no meaningful payload, so theirs is
    /// never inspected.
    pub fn decode(kind: CommandKind, payload: Value) -> Result<Self, PayloadError> {
        let wrap = |source| PayloadError {
            kind,
            message: kind.invalid_payload_message(),
            source,
        };

        let msg = match kind {
            CommandKind::CreateTile => {
                ClientMessage::CreateTile(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::RevealTile => {
                ClientMessage::RevealTile(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::RevealAll => ClientMessage::RevealAll,
            CommandKind::VoteTile => {
                ClientMessage::VoteTile(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::CreateColumn => {
                ClientMessage::CreateColumn(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::UpdateColumn => {
                ClientMessage::UpdateColumn(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::DeleteColumn => {
                ClientMessage::DeleteColumn(serde_json::from_value(payload).map_err(wrap)?)
            }
            CommandKind::TypingStart => ClientMessage::Typing { typing: true },
            CommandKind::TypingStop => ClientMessage::Typing { typing: false },
            CommandKind::CreateThread => {
                ClientMessage::CreateThread(serde_json::from_value(payload).map_err(wrap)?)
            }
        };
        Ok(msg)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            ClientMessage::CreateTile(_) => CommandKind::CreateTile,
            ClientMessage::RevealTile(_) => CommandKind::RevealTile,
            ClientMessage::RevealAll => CommandKind::RevealAll,
            ClientMessage::VoteTile(_) => CommandKind::VoteTile,
            ClientMessage::CreateColumn(_) => CommandKind::CreateColumn,
            ClientMessage::UpdateColumn(_) => CommandKind::UpdateColumn,
            ClientMessage::DeleteColumn(_) => CommandKind::DeleteColumn,
            ClientMessage::Typing { typing: true } => CommandKind::TypingStart,
            ClientMessage::Typing { typing: false } => CommandKind::TypingStop,
            ClientMessage::CreateThread(_) => CommandKind::CreateThread,
        }
    }
}

/// Transient typing indicator, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user_id: String,
    pub board_id: String,
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Full board state, admin key redacted.
    #[serde(rename = "server:board:state_update")]
    BoardState(Board),
    #[serde(rename = "server:user:is_typing")]
    Typing(TypingEvent),
    /// The board is gone from the store; the connection is about to close.
    #[serde(rename = "server:board:expired")]
    BoardExpired(Notice),
    #[serde(rename = "error")]
    Error(Notice),
}

impl ServerMessage {
    pub fn board_state(board: &Board) -> Self {
        ServerMessage::BoardState(board.redacted())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(Notice {
            message: message.into(),
        })
    }

    pub fn expired() -> Self {
        ServerMessage::BoardExpired(Notice {
            message: "This board has expired".to_string(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::BoardState(_) => "server:board:state_update",
            ServerMessage::Typing(_) => "server:user:is_typing",
            ServerMessage::BoardExpired(_) => "server:board:expired",
            ServerMessage::Error(_) => "error",
        }
    }
}
