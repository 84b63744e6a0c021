//! Tilegram wire protocol: message types, reason codes and version.

use std::fmt;

use crate::identity::SessionId;

/// Current protocol version. Sent on connect; a mismatch is a hard rejection.
pub const PROTOCOL_VERSION: u8 = 0;

/// Default UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 57198;

/// Every client packet carries the sender's session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub session: SessionId,
    pub event: ClientEvent,
}

impl ClientMessage {
    pub fn new(session: SessionId, event: ClientEvent) -> Self {
        Self { session, event }
    }
}

/// Client to server requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connect { version: u8, name: String },
    Disconnect,
    Ready(bool),
    /// Dictionary lookup for one word.
    CheckWord(String),
    /// Exchange one letter for three. `dump_n` is the client's dump sequence number.
    Dump { dump_n: i16, letter: char },
    /// Ask for peel round `peel_n`.
    Peel { peel_n: i16 },
    /// Acknowledge a critical packet.
    Ack { ack_n: i16 },
}

/// Server to client events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Disconnect(DisconnectReason),
    /// Roster change about `subject`.
    Info { subject: SessionId, event: InfoEvent },
    CheckResult { word: String, valid: bool },
    /// Answer to a dump. A single letter means the dump was refused.
    DumpResult { dump_n: i16, letters: String },
    /// Peel broadcast. `peeler` is `None` for the opening split.
    Peel {
        peel_n: i16,
        remaining: i16,
        peeler: Option<SessionId>,
        letters: String,
    },
    /// Game over. `None` when nobody won outright.
    Done { winner: Option<SessionId> },
}

impl ServerMessage {
    /// Whether the server queues this message until acknowledged.
    pub fn is_critical(&self) -> bool {
        match self {
            ServerMessage::Info { event, .. } => {
                matches!(event, InfoEvent::Joined { .. } | InfoEvent::Left)
            }
            ServerMessage::Peel { .. } | ServerMessage::Done { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoEvent {
    Joined { name: String },
    Left,
    Ready,
    Unready,
}

impl InfoEvent {
    pub fn code(&self) -> u8 {
        match self {
            InfoEvent::Joined { .. } => 0,
            InfoEvent::Left => 1,
            InfoEvent::Ready => 2,
            InfoEvent::Unready => 3,
        }
    }
}

/// Why the server refused or dropped a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    BadVersion,
    Full,
    BadAuth,
    InProgress,
    ShuttingDown,
}

impl DisconnectReason {
    pub fn code(self) -> u8 {
        match self {
            DisconnectReason::BadVersion => 0,
            DisconnectReason::Full => 1,
            DisconnectReason::BadAuth => 2,
            DisconnectReason::InProgress => 3,
            DisconnectReason::ShuttingDown => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => DisconnectReason::BadVersion,
            1 => DisconnectReason::Full,
            2 => DisconnectReason::BadAuth,
            3 => DisconnectReason::InProgress,
            4 => DisconnectReason::ShuttingDown,
            _ => return None,
        })
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisconnectReason::BadVersion => "incompatible version",
            DisconnectReason::Full => "server is full",
            DisconnectReason::BadAuth => "wrong password",
            DisconnectReason::InProgress => "game in progress",
            DisconnectReason::ShuttingDown => "server shutting down",
        })
    }
}
