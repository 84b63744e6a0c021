//! Datagram codec: one packet per datagram, no framing.
//!
//! ```text
//! client: [type u8][session str][fields...]
//! server: [type u8][fields...]
//! str:    [len u32 BE][utf-8 bytes]
//! ```
//!
//! Sequence numbers are `i16` big-endian, flags are a single byte, and a
//! dumped letter travels as one signed byte.

use crate::identity::SessionId;
use crate::protocol::{ClientEvent, ClientMessage, DisconnectReason, InfoEvent, ServerMessage};

/// Packet type codes, client to server.
pub mod client_type {
    pub const CONNECT: u8 = 0;
    pub const DISCONNECT: u8 = 1;
    pub const READY: u8 = 2;
    pub const CHECK: u8 = 3;
    pub const DUMP: u8 = 4;
    pub const PEEL: u8 = 5;
    pub const ACK: u8 = 6;
}

/// Packet type codes, server to client.
pub mod server_type {
    pub const DISCONNECT: u8 = 0;
    pub const INFO: u8 = 1;
    pub const CHECK: u8 = 2;
    pub const DUMP: u8 = 3;
    pub const PEEL: u8 = 4;
    pub const DONE: u8 = 5;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("packet truncated")]
    Truncated,
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid letter byte {0:#04x}")]
    InvalidLetter(u8),
    #[error("unknown disconnect reason {0}")]
    UnknownReason(u8),
    #[error("unknown info event {0}")]
    UnknownInfoEvent(u8),
}

struct Writer(Vec<u8>);

impl Writer {
    fn new(kind: u8) -> Self {
        Writer(vec![kind])
    }

    fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn bool(self, v: bool) -> Self {
        self.u8(v as u8)
    }

    fn str(mut self, s: &str) -> Self {
        self.0.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::Truncated);
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, WireError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    fn str(&mut self) -> Result<String, WireError> {
        let b = self.take(4)?;
        let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn letter(&mut self) -> Result<char, WireError> {
        let b = self.u8()?;
        if b.is_ascii_uppercase() {
            Ok(b as char)
        } else {
            Err(WireError::InvalidLetter(b))
        }
    }

    /// A string of tile letters.
    fn letters(&mut self) -> Result<String, WireError> {
        let s = self.str()?;
        match s.bytes().find(|b| !b.is_ascii_uppercase()) {
            Some(bad) => Err(WireError::InvalidLetter(bad)),
            None => Ok(s),
        }
    }
}

pub fn encode_client(msg: &ClientMessage) -> Vec<u8> {
    let session = msg.session.as_str();
    let w = match &msg.event {
        ClientEvent::Connect { version, name } => Writer::new(client_type::CONNECT)
            .str(session)
            .u8(*version)
            .str(name),
        ClientEvent::Disconnect => Writer::new(client_type::DISCONNECT).str(session),
        ClientEvent::Ready(ready) => Writer::new(client_type::READY).str(session).bool(*ready),
        ClientEvent::CheckWord(word) => Writer::new(client_type::CHECK).str(session).str(word),
        ClientEvent::Dump { dump_n, letter } => Writer::new(client_type::DUMP)
            .str(session)
            .i16(*dump_n)
            .u8(*letter as u8),
        ClientEvent::Peel { peel_n } => Writer::new(client_type::PEEL).str(session).i16(*peel_n),
        ClientEvent::Ack { ack_n } => Writer::new(client_type::ACK).str(session).i16(*ack_n),
    };
    w.finish()
}

/// Decode one client datagram. Trailing bytes are ignored.
pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, WireError> {
    let mut r = Reader { buf: bytes };
    let kind = r.u8()?;
    let session = SessionId::from(r.str()?);
    let event = match kind {
        client_type::CONNECT => ClientEvent::Connect {
            version: r.u8()?,
            name: r.str()?,
        },
        client_type::DISCONNECT => ClientEvent::Disconnect,
        client_type::READY => ClientEvent::Ready(r.bool()?),
        client_type::CHECK => ClientEvent::CheckWord(r.str()?),
        client_type::DUMP => ClientEvent::Dump {
            dump_n: r.i16()?,
            letter: r.letter()?,
        },
        client_type::PEEL => ClientEvent::Peel { peel_n: r.i16()? },
        client_type::ACK => ClientEvent::Ack { ack_n: r.i16()? },
        other => return Err(WireError::UnknownType(other)),
    };
    Ok(ClientMessage { session, event })
}

pub fn encode_server(msg: &ServerMessage) -> Vec<u8> {
    let w = match msg {
        ServerMessage::Disconnect(reason) => {
            Writer::new(server_type::DISCONNECT).u8(reason.code())
        }
        ServerMessage::Info { subject, event } => {
            let w = Writer::new(server_type::INFO)
                .str(subject.as_str())
                .u8(event.code());
            match event {
                InfoEvent::Joined { name } => w.str(name),
                _ => w,
            }
        }
        ServerMessage::CheckResult { word, valid } => {
            Writer::new(server_type::CHECK).str(word).bool(*valid)
        }
        ServerMessage::DumpResult { dump_n, letters } => {
            Writer::new(server_type::DUMP).i16(*dump_n).str(letters)
        }
        ServerMessage::Peel {
            peel_n,
            remaining,
            peeler,
            letters,
        } => Writer::new(server_type::PEEL)
            .i16(*peel_n)
            .i16(*remaining)
            .str(peeler.as_ref().map_or("", SessionId::as_str))
            .str(letters),
        ServerMessage::Done { winner } => match winner {
            Some(id) => Writer::new(server_type::DONE).bool(true).str(id.as_str()),
            None => Writer::new(server_type::DONE).bool(false),
        },
    };
    w.finish()
}

/// Decode one server datagram. Trailing bytes are ignored.
pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, WireError> {
    let mut r = Reader { buf: bytes };
    let kind = r.u8()?;
    Ok(match kind {
        server_type::DISCONNECT => {
            let code = r.u8()?;
            let reason = DisconnectReason::from_code(code).ok_or(WireError::UnknownReason(code))?;
            ServerMessage::Disconnect(reason)
        }
        server_type::INFO => {
            let subject = SessionId::from(r.str()?);
            let event = match r.u8()? {
                0 => InfoEvent::Joined { name: r.str()? },
                1 => InfoEvent::Left,
                2 => InfoEvent::Ready,
                3 => InfoEvent::Unready,
                other => return Err(WireError::UnknownInfoEvent(other)),
            };
            ServerMessage::Info { subject, event }
        }
        server_type::CHECK => ServerMessage::CheckResult {
            word: r.str()?,
            valid: r.bool()?,
        },
        server_type::DUMP => ServerMessage::DumpResult {
            dump_n: r.i16()?,
            letters: r.letters()?,
        },
        server_type::PEEL => {
            let peel_n = r.i16()?;
            let remaining = r.i16()?;
            let peeler = r.str()?;
            ServerMessage::Peel {
                peel_n,
                remaining,
                peeler: (!peeler.is_empty()).then(|| SessionId::from(peeler)),
                letters: r.letters()?,
            }
        }
        server_type::DONE => ServerMessage::Done {
            winner: if r.bool()? {
                Some(SessionId::from(r.str()?))
            } else {
                None
            },
        },
        other => return Err(WireError::UnknownType(other)),
    })
}
