//! Host-driven server: the host feeds datagrams and elapsed time, the core
//! returns datagrams to send.
//!
//! The host loop is expected to run, once per iteration:
//! 1. [`ServerCore::tick`] with the time since the previous iteration;
//! 2. check [`ServerControl::shutdown_requested`] and, if set, send the
//!    output of [`ServerCore::shutdown`] and stop;
//! 3. stop if [`ServerCore::can_shutdown`];
//! 4. receive at most one datagram without blocking and pass it to
//!    [`ServerCore::on_datagram`].
//!
//! All game state lives here and is touched only by that loop. The only
//! state shared with other threads is [`ServerControl`].

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::dictionary::WordCheck;
use crate::game::{Game, GameError};
use crate::identity::SessionId;
use crate::player::{Player, ACK_TIMEOUT, POLL_INTERVAL};
use crate::protocol::{
    ClientEvent, ClientMessage, DisconnectReason, InfoEvent, ServerMessage, PROTOCOL_VERSION,
};
use crate::wire;

/// Retry timing for critical packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    pub ack_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            ack_timeout: ACK_TIMEOUT,
        }
    }
}

/// Datagram the host should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Send(SocketAddr, Vec<u8>),
}

/// Lifecycle of a server, as seen by the embedding thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    Running,
    /// Stopped by a shutdown request.
    Aborted,
    /// Game over and every player acknowledged the result.
    Done,
}

/// Shutdown flag and status shared between the server loop and its owner,
/// each behind its own lock.
#[derive(Debug)]
pub struct ServerControl {
    shutdown: Mutex<bool>,
    status: Mutex<Status>,
}

impl Default for ServerControl {
    fn default() -> Self {
        Self {
            shutdown: Mutex::new(false),
            status: Mutex::new(Status::Loading),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ServerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        *lock(&self.shutdown) = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        *lock(&self.shutdown)
    }

    pub fn status(&self) -> Status {
        *lock(&self.status)
    }

    pub fn set_status(&self, status: Status) {
        *lock(&self.status) = status;
    }
}

/// Authoritative server for one game.
pub struct ServerCore<D> {
    game: Game,
    dictionary: D,
    timing: Timing,
    /// First player to request the current peel round.
    peeler: Option<SessionId>,
}

impl<D: WordCheck> ServerCore<D> {
    pub fn with_game(game: Game, dictionary: D, timing: Timing) -> Self {
        Self {
            game,
            dictionary,
            timing,
            peeler: None,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Game over and all acknowledgements in.
    pub fn can_shutdown(&self) -> bool {
        self.game.can_shutdown()
    }

    /// Advance per-player timers: drop players whose ack timed out, resend
    /// due packets, and announce the result if the game just ended.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        let timing = self.timing;

        let mut timed_out = Vec::new();
        for (id, player) in self.game.players_mut() {
            if !player.has_pending() {
                continue;
            }
            player.step(elapsed);
            if player.timed_out(timing.ack_timeout) {
                info!("{} timed out", player.name());
                timed_out.push(id.clone());
            } else if player.resend_due(timing.poll_interval) {
                if let Some(packet) = player.pending() {
                    debug!("resending to {}", player.name());
                    actions.push(OutboundAction::Send(player.addr(), packet.to_vec()));
                }
            }
        }

        if !timed_out.is_empty() {
            for id in &timed_out {
                if let Err(e) = self.game.remove_player(id) {
                    warn!("removing {}: {}", id, e);
                }
            }
            for id in timed_out {
                self.broadcast_critical(
                    &ServerMessage::Info {
                        subject: id,
                        event: InfoEvent::Left,
                    },
                    &mut actions,
                );
            }
            self.game.check_waiting();
        }

        if self.game.is_ready_to_finish() {
            self.game.finish();
            let winner = if self.game.players().len() > 1 {
                self.game.winner.clone()
            } else {
                None
            };
            match winner.as_ref().and_then(|w| self.game.player_name(w)) {
                Some(name) => info!("{} won the game", name),
                None => info!("game over without a winner"),
            }
            self.broadcast_critical(&ServerMessage::Done { winner }, &mut actions);
        }

        actions
    }

    /// Tell every player the server is going away. Nothing is retried.
    pub fn shutdown(&mut self) -> Vec<OutboundAction> {
        info!("server shutting down, notifying {} players", self.game.players().len());
        let bytes = wire::encode_server(&ServerMessage::Disconnect(DisconnectReason::ShuttingDown));
        self.game
            .players()
            .values()
            .map(|p| OutboundAction::Send(p.addr(), bytes.clone()))
            .collect()
    }

    /// Handle one datagram from `from`, then deal a peel if one is due.
    /// Malformed or unexpected packets are logged and dropped.
    pub fn on_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        match wire::decode_client(bytes) {
            Ok(msg) => self.dispatch(from, msg, &mut actions),
            Err(e) => warn!("dropping datagram from {}: {}", from, e),
        }
        self.try_peel(&mut actions);
        actions
    }

    fn dispatch(&mut self, from: SocketAddr, msg: ClientMessage, out: &mut Vec<OutboundAction>) {
        let ClientMessage { session, event } = msg;
        if !matches!(event, ClientEvent::Connect { .. }) && !self.game.has_player(&session) {
            debug!("dropping packet from unknown session {}", session);
            return;
        }

        match event {
            ClientEvent::Connect { version, name } => self.on_connect(from, session, version, name, out),
            ClientEvent::Disconnect => {
                if let Some(name) = self.game.player_name(&session) {
                    info!("{} has left the game", name);
                }
                if let Err(e) = self.game.remove_player(&session) {
                    warn!("disconnect: {}", e);
                    return;
                }
                self.broadcast_critical(
                    &ServerMessage::Info {
                        subject: session,
                        event: InfoEvent::Left,
                    },
                    out,
                );
                // the leaver may have held the only unacknowledged packet
                self.game.check_waiting();
            }
            ClientEvent::Ready(ready) => {
                if let Err(e) = self.game.set_ready(&session, ready) {
                    warn!("ready: {}", e);
                    return;
                }
                let event = if ready { InfoEvent::Ready } else { InfoEvent::Unready };
                let bytes = wire::encode_server(&ServerMessage::Info {
                    subject: session,
                    event,
                });
                for player in self.game.players().values() {
                    out.push(OutboundAction::Send(player.addr(), bytes.clone()));
                }
            }
            ClientEvent::CheckWord(word) => {
                let valid = self.dictionary.check_word(&word);
                debug!("{} is {}a word", word, if valid { "" } else { "not " });
                let reply = ServerMessage::CheckResult { word, valid };
                out.push(OutboundAction::Send(from, wire::encode_server(&reply)));
            }
            ClientEvent::Dump { dump_n, letter } => {
                if self.game.is_finished() {
                    warn!("dump received after game end");
                    return;
                }
                match self.game.dump(&session, dump_n, letter) {
                    Ok(letters) => {
                        if let Some(name) = self.game.player_name(&session) {
                            info!("{} dumped {} and received {}", name, letter, letters);
                        }
                        let reply = ServerMessage::DumpResult { dump_n, letters };
                        out.push(OutboundAction::Send(from, wire::encode_server(&reply)));
                    }
                    Err(e) => warn!("dump from {}: {}", session, e),
                }
            }
            ClientEvent::Peel { peel_n } => {
                if self.game.is_finished() {
                    warn!("peel received after game end");
                    return;
                }
                if !self.game.check_peel(peel_n) {
                    warn!(
                        "peel out of order: got {}, expected {}",
                        peel_n,
                        self.game.peel_number()
                    );
                } else if self.peeler.is_none() {
                    self.peeler = Some(session);
                } else if let Some(name) = self.game.player_name(&session) {
                    info!("{} also peeled, waiting on some players", name);
                }
            }
            ClientEvent::Ack { ack_n } => {
                let Some(player) = self.game.player_mut(&session) else {
                    return;
                };
                if !player.acknowledged(ack_n) {
                    warn!("mismatched ack {} from {}", ack_n, player.name());
                    return;
                }
                let addr = player.addr();
                match player.pending().map(<[u8]>::to_vec) {
                    Some(next) => out.push(OutboundAction::Send(addr, next)),
                    None => self.game.check_waiting(),
                }
            }
        }
    }

    fn on_connect(
        &mut self,
        from: SocketAddr,
        session: SessionId,
        version: u8,
        name: String,
        out: &mut Vec<OutboundAction>,
    ) {
        if version != PROTOCOL_VERSION {
            warn!(
                "client failed to join: need protocol version {}, got {}",
                PROTOCOL_VERSION, version
            );
            Self::reject(from, DisconnectReason::BadVersion, out);
            return;
        }

        if !self.game.has_player(&session) {
            if let Err(e) = self.game.add_player(session.clone(), from, &name) {
                warn!("client failed to join: {}", e);
                if let Some(reason) = rejection_reason(&e) {
                    Self::reject(from, reason, out);
                }
                return;
            }

            // tell everyone else about the newcomer, and the newcomer about everyone else
            let joined = wire::encode_server(&ServerMessage::Info {
                subject: session.clone(),
                event: InfoEvent::Joined { name: name.clone() },
            });
            let mut roster = Vec::new();
            for (id, player) in self.game.players_mut() {
                if *id == session {
                    continue;
                }
                Self::enqueue_critical(player, joined.clone(), out);
                roster.push(wire::encode_server(&ServerMessage::Info {
                    subject: id.clone(),
                    event: InfoEvent::Joined {
                        name: player.name().to_string(),
                    },
                }));
            }
            if !roster.is_empty() {
                if let Some(player) = self.game.player_mut(&session) {
                    for packet in roster {
                        Self::enqueue_critical(player, packet, out);
                    }
                }
                self.game.wait();
            }
            info!("{} has joined the game", name);
        }

        // known player by now: confirm, not critical
        let confirm = ServerMessage::Info {
            subject: session,
            event: InfoEvent::Joined { name },
        };
        out.push(OutboundAction::Send(from, wire::encode_server(&confirm)));
    }

    fn reject(to: SocketAddr, reason: DisconnectReason, out: &mut Vec<OutboundAction>) {
        let bytes = wire::encode_server(&ServerMessage::Disconnect(reason));
        out.push(OutboundAction::Send(to, bytes));
    }

    fn enqueue_critical(player: &mut Player, packet: Vec<u8>, out: &mut Vec<OutboundAction>) {
        if player.add_pending(packet.clone()) {
            out.push(OutboundAction::Send(player.addr(), packet));
        }
    }

    /// Queue `msg` as critical for every player.
    fn broadcast_critical(&mut self, msg: &ServerMessage, out: &mut Vec<OutboundAction>) {
        debug_assert!(msg.is_critical());
        if self.game.players().is_empty() {
            return;
        }
        let bytes = wire::encode_server(msg);
        for player in self.game.players_mut().values_mut() {
            Self::enqueue_critical(player, bytes.clone(), out);
        }
        self.game.wait();
    }

    fn try_peel(&mut self, out: &mut Vec<OutboundAction>) {
        if !self.game.can_peel() {
            return;
        }
        let peeler = self.peeler.take();
        match peeler.as_ref().and_then(|p| self.game.player_name(p)) {
            Some(name) => info!("{}: peel!", name),
            None => info!("split!"),
        }

        if self.game.peel() {
            self.game.winner = peeler;
            return;
        }

        let peel_n = self.game.peel_number().wrapping_sub(1);
        let remaining = i16::try_from(self.game.remaining()).unwrap_or(i16::MAX);
        for player in self.game.players_mut().values_mut() {
            debug!("sending {} {}", player.name(), player.last_peel());
            let msg = ServerMessage::Peel {
                peel_n,
                remaining,
                peeler: peeler.clone(),
                letters: player.last_peel().to_string(),
            };
            Self::enqueue_critical(player, wire::encode_server(&msg), out);
        }
        self.game.wait();
    }
}

/// Disconnect reason for a refused join.
fn rejection_reason(err: &GameError) -> Option<DisconnectReason> {
    match err {
        GameError::Full => Some(DisconnectReason::Full),
        GameError::InProgress => Some(DisconnectReason::InProgress),
        _ => None,
    }
}
