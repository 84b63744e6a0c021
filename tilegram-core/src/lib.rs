//! Tilegram game core: letter pool, word grid, and the server and client
//! state machines for the multiplayer word game.
//! Host-driven: no I/O; the host passes datagrams and elapsed time and
//! receives datagrams to send.

pub mod bunch;
pub mod client;
pub mod dictionary;
pub mod game;
pub mod grid;
pub mod hand;
pub mod identity;
pub mod player;
pub mod protocol;
pub mod restore;
pub mod server;
pub mod wire;

pub use bunch::{Bunch, Multiplier, MultiplierError};
pub use client::{ClientCore, Notice, Peer, RequestKind, Severity};
pub use dictionary::{Dictionary, WordCheck};
pub use game::{Game, GameError};
pub use grid::{Grid, GridError, Pos, Tile, TileFlag, WordMap, WordPos};
pub use hand::Hand;
pub use identity::SessionId;
pub use protocol::{
    ClientEvent, ClientMessage, DisconnectReason, InfoEvent, ServerMessage, DEFAULT_PORT,
    PROTOCOL_VERSION,
};
pub use restore::{RestoreError, SavedGame};
pub use server::{OutboundAction, ServerControl, ServerCore, Status, Timing};
pub use wire::{decode_client, decode_server, encode_client, encode_server, WireError};
