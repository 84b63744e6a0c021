//! Host-driven client: local board, dictionary cache and the client half of
//! the reliable-delivery contract.
//!
//! The host frame loop passes each received datagram to
//! [`ClientCore::on_datagram`], calls [`ClientCore::step`] once per frame, and
//! sends whatever [`ClientCore::drain_outbound`] returns to the server.
//!
//! The client keeps one request of its own in flight (connect, ready, word
//! lookup, dump or peel) and resends it until the matching answer arrives.
//! Critical server packets are acknowledged with the client's ack counter;
//! a redundant copy is answered with the previous number, which the server
//! still expects if the first acknowledgement was lost.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use log::{debug, warn};

use crate::bunch::Multiplier;
use crate::grid::{Grid, GridError, WordMap};
use crate::hand::Hand;
use crate::identity::SessionId;
use crate::player::{ACK_TIMEOUT, POLL_INTERVAL};
use crate::protocol::{
    ClientEvent, ClientMessage, DisconnectReason, InfoEvent, ServerMessage, PROTOCOL_VERSION,
};
use crate::restore::SavedGame;
use crate::wire;

/// Connection attempts are retried slowly and given a long time to answer.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_POLL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    High,
    Critical,
}

/// A message for the player explaining what happened or why an action failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
}

/// Another player, as this client knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect,
    Ready,
    Check,
    Dump,
    Peel,
}

#[derive(Debug)]
struct Request {
    kind: RequestKind,
    bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct ClientCore {
    session: SessionId,
    single_player: bool,

    grid: Grid,
    hand: Hand,
    notices: VecDeque<Notice>,
    peers: BTreeMap<SessionId, Peer>,

    /// Known answers for looked-up words.
    dictionary: BTreeMap<String, bool>,
    lookup_words: WordMap,
    bad_words: WordMap,

    pending: Option<Request>,
    outbox: Vec<Vec<u8>>,
    time_stale: Duration,
    poll_pause: Duration,
    timeout: Duration,
    polling: Duration,

    connected: bool,
    playing: bool,
    started: bool,
    is_ready: bool,
    waiting: bool,
    game_over: bool,
    winner: Option<SessionId>,
    peel_n: i16,
    dump_n: i16,
    ack_num: i16,
}

impl ClientCore {
    /// Start connecting under a fresh session id.
    pub fn new(name: &str, single_player: bool) -> Self {
        Self::with_session(SessionId::generate(), name, single_player)
    }

    pub fn with_session(session: SessionId, name: &str, single_player: bool) -> Self {
        let mut client = Self {
            session,
            single_player,
            grid: Grid::new(),
            hand: Hand::new(),
            notices: VecDeque::new(),
            peers: BTreeMap::new(),
            dictionary: BTreeMap::new(),
            lookup_words: WordMap::new(),
            bad_words: WordMap::new(),
            pending: None,
            outbox: Vec::new(),
            time_stale: Duration::ZERO,
            poll_pause: Duration::ZERO,
            timeout: CONNECT_TIMEOUT,
            polling: CONNECT_POLL,
            connected: false,
            playing: false,
            started: false,
            is_ready: false,
            waiting: false,
            game_over: false,
            winner: None,
            peel_n: -1,
            dump_n: -1,
            ack_num: 0,
        };
        client.request(
            RequestKind::Connect,
            ClientEvent::Connect {
                version: PROTOCOL_VERSION,
                name: name.to_string(),
            },
        );
        if single_player {
            client.notify("Loading...", Severity::Critical);
        } else {
            client.notify("Connecting...", Severity::Critical);
        }
        client
    }

    /// Connect with the board and hand of a saved session.
    pub fn restore(name: &str, single_player: bool, saved: &SavedGame) -> Result<Self, GridError> {
        let mut client = Self::new(name, single_player);
        client.grid = saved.grid()?;
        client.hand = saved.hand.clone();
        Ok(client)
    }

    /// Snapshot the board for a later [`ClientCore::restore`].
    pub fn save(&self, dictionary: &str, multiplier: Multiplier) -> SavedGame {
        SavedGame::capture(dictionary, multiplier, &self.hand, &self.grid)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn hand(&self) -> &Hand {
        &self.hand
    }

    pub fn peers(&self) -> &BTreeMap<SessionId, Peer> {
        &self.peers
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn in_progress(&self) -> bool {
        self.playing
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// A request is outstanding; the frame loop must not start a conflicting one.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Kind of the request currently in flight.
    pub fn pending_request(&self) -> Option<RequestKind> {
        self.pending.as_ref().map(|r| r.kind)
    }

    /// Last peel round received; -1 before the split.
    pub fn peel_number(&self) -> i16 {
        self.peel_n
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn winner(&self) -> Option<&SessionId> {
        self.winner.as_ref()
    }

    /// True once, right after the opening split arrives.
    pub fn game_started(&mut self) -> bool {
        std::mem::take(&mut self.started)
    }

    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn notify(&mut self, text: impl Into<String>, severity: Severity) {
        self.notices.push_back(Notice {
            text: text.into(),
            severity,
        });
    }

    fn send(&mut self, event: ClientEvent) {
        let msg = ClientMessage::new(self.session.clone(), event);
        self.outbox.push(wire::encode_client(&msg));
    }

    /// Replace the request in flight and send it.
    fn request(&mut self, kind: RequestKind, event: ClientEvent) {
        let msg = ClientMessage::new(self.session.clone(), event);
        let bytes = wire::encode_client(&msg);
        self.outbox.push(bytes.clone());
        self.pending = Some(Request { kind, bytes });
        self.time_stale = Duration::ZERO;
        self.poll_pause = Duration::ZERO;
    }

    fn clear_pending(&mut self) {
        self.pending = None;
        self.time_stale = Duration::ZERO;
        self.poll_pause = Duration::ZERO;
    }

    fn ack(&mut self, ack_n: i16) {
        self.send(ClientEvent::Ack { ack_n });
    }

    /// Advance retry timers for the request in flight.
    pub fn step(&mut self, elapsed: Duration) {
        let Some(request) = &self.pending else {
            return;
        };
        self.time_stale += elapsed;
        self.poll_pause += elapsed;

        if self.time_stale > self.timeout {
            if self.single_player {
                self.notify("Sorry, this is taking a while to load...", Severity::Critical);
                self.time_stale -= self.timeout;
            } else {
                self.notify("Disconnected from server: server timed out", Severity::Critical);
                self.disconnect();
            }
        } else if self.poll_pause >= self.polling {
            let bytes = request.bytes.clone();
            self.outbox.push(bytes);
            self.poll_pause -= self.polling;
        }
    }

    /// Drop the connection locally. Nothing is sent.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.playing = false;
        self.waiting = false;
        self.clear_pending();
    }

    /// Tell the server we are leaving, then drop the connection.
    pub fn leave(&mut self) {
        self.send(ClientEvent::Disconnect);
        self.disconnect();
    }

    /// Toggle the ready flag in the lobby.
    pub fn ready(&mut self) {
        if !self.connected {
            if !self.single_player {
                self.notify("You are not connected to the server!", Severity::High);
            }
            return;
        }
        if self.playing || (self.single_player && self.is_ready) {
            return;
        }
        self.is_ready = !self.is_ready;
        self.request(RequestKind::Ready, ClientEvent::Ready(self.is_ready));
        if !self.single_player {
            let text = if self.is_ready {
                "You are ready"
            } else {
                "You are not ready"
            };
            self.notify(text, Severity::Low);
        }
    }

    /// Place a tile of `letter` from the hand at `(x, y)`. A tile already
    /// there goes back to the hand.
    pub fn place(&mut self, x: i32, y: i32, letter: char) -> bool {
        if self.grid.get(x, y).is_some_and(|t| t.letter() == letter) {
            return true;
        }
        let Some(tile) = self.hand.take(letter) else {
            self.notify(format!("You are out of {}s!", letter), Severity::High);
            return false;
        };
        if let Some(previous) = self.grid.swap(x, y, tile) {
            self.hand.add(previous);
        }
        true
    }

    /// Move the tile at `(x, y)` back to the hand.
    pub fn take(&mut self, x: i32, y: i32) -> bool {
        match self.grid.remove(x, y) {
            Some(tile) => {
                self.hand.add(tile);
                true
            }
            None => false,
        }
    }

    pub fn highlight(&mut self, letter: char) -> bool {
        self.notify(format!("Highlighting {}s.", letter), Severity::High);
        let found = self.grid.highlight(letter);
        if !found {
            self.notify(format!("There are no {}s in play.", letter), Severity::High);
        }
        found
    }

    /// Trade one `letter` from the hand for three from the bunch.
    pub fn dump(&mut self, letter: char) {
        if !self.connected {
            if !self.single_player {
                self.notify("You are not connected to the server!", Severity::High);
            }
            return;
        }
        if !self.hand.has_any(letter) {
            self.notify(
                format!("You don't have any {}s in your hand!", letter),
                Severity::High,
            );
            return;
        }
        if self.waiting {
            self.notify(
                "Waiting for server response. Try again in a moment.",
                Severity::High,
            );
            return;
        }
        self.hand.take(letter);
        self.dump_n = self.dump_n.wrapping_add(1);
        self.request(
            RequestKind::Dump,
            ClientEvent::Dump {
                dump_n: self.dump_n,
                letter,
            },
        );
        self.waiting = true;
    }

    /// Try to peel. Returns `true` if the peel request went out right away;
    /// `false` if it was refused or words must be looked up first.
    pub fn peel(&mut self) -> bool {
        if !self.connected {
            if !self.single_player {
                self.notify("You are not connected to the server!", Severity::High);
            }
            return false;
        }

        if self.waiting {
            self.notify(
                "Waiting for server response. Try again in a moment.",
                Severity::High,
            );
            return false;
        }

        self.lookup_words.clear();
        self.bad_words.clear();

        if !self.ready_to_peel() {
            return false;
        }

        for (word, positions) in self.grid.get_words() {
            match self.dictionary.get(&word) {
                None => {
                    self.lookup_words.insert(word, positions);
                }
                Some(false) => {
                    self.bad_words.insert(word, positions);
                }
                Some(true) => {}
            }
        }

        if self.lookup_words.is_empty() || !self.bad_words.is_empty() {
            return self.resolve_peel();
        }

        self.request_next_lookup();
        self.waiting = true;
        false
    }

    /// Every letter placed and connected; notifies otherwise.
    fn ready_to_peel(&mut self) -> bool {
        if !self.hand.is_empty() {
            self.notify("You have not used all of your letters.", Severity::High);
            return false;
        }
        if !self.grid.is_continuous() {
            self.notify("Your tiles are not all connected.", Severity::High);
            return false;
        }
        true
    }

    fn request_next_lookup(&mut self) {
        if let Some(word) = self.lookup_words.keys().next().cloned() {
            debug!("requesting lookup of {}", word);
            self.request(RequestKind::Check, ClientEvent::CheckWord(word));
        }
    }

    /// Finish a peel attempt once every word has an answer: flag bad words,
    /// or ask for the next peel round.
    fn resolve_peel(&mut self) -> bool {
        if !self.bad_words.is_empty() {
            let bad = std::mem::take(&mut self.bad_words);
            for (word, positions) in &bad {
                self.notify(format!("{} is not a word.", word), Severity::High);
                for &at in positions {
                    self.grid.bad_word(at);
                }
            }
            self.lookup_words.clear();
            self.waiting = false;
            return false;
        }
        // letters may have arrived while the lookups were in flight
        if !self.ready_to_peel() {
            self.lookup_words.clear();
            self.waiting = false;
            return false;
        }

        let next = self.peel_n.wrapping_add(1);
        debug!("no incorrect words, requesting peel {}", next);
        self.request(RequestKind::Peel, ClientEvent::Peel { peel_n: next });
        self.waiting = true;
        true
    }

    fn peer_name(&self, id: &SessionId) -> String {
        self.peers
            .get(id)
            .map_or_else(|| "Someone".to_string(), |p| p.name.clone())
    }

    /// Handle one datagram from the server. Malformed packets are logged and dropped.
    pub fn on_datagram(&mut self, bytes: &[u8]) {
        match wire::decode_server(bytes) {
            Ok(msg) => self.handle(msg),
            Err(e) => warn!("dropping server packet: {}", e),
        }
    }

    fn handle(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Info { subject, event } => self.on_info(subject, event),
            ServerMessage::Disconnect(reason) => self.on_disconnect(reason),
            ServerMessage::CheckResult { word, valid } => self.on_check(word, valid),
            ServerMessage::Peel {
                peel_n,
                remaining,
                peeler,
                letters,
            } => self.on_peel(peel_n, remaining, peeler, &letters),
            ServerMessage::DumpResult { dump_n, letters } => self.on_dump(dump_n, &letters),
            ServerMessage::Done { winner } => self.on_done(winner),
        }
    }

    fn on_info(&mut self, subject: SessionId, event: InfoEvent) {
        if !self.connected {
            if !self.single_player {
                self.notify("Connected...", Severity::Critical);
            }
            self.connected = true;
            self.timeout = ACK_TIMEOUT;
            self.polling = POLL_INTERVAL;
            self.clear_pending();
            if self.single_player {
                self.ready();
            }
        }

        if subject == self.session {
            let confirms = matches!(
                (self.is_ready, &event),
                (true, InfoEvent::Ready) | (false, InfoEvent::Unready)
            );
            if !self.playing && confirms && self.pending_request() == Some(RequestKind::Ready) {
                self.clear_pending();
            }
            return;
        }

        match event {
            InfoEvent::Joined { name } => {
                let ack_n = if self.peers.contains_key(&subject) {
                    debug!("redundant join for {}", name);
                    self.ack_num.wrapping_sub(1)
                } else {
                    self.notify(format!("{} joined the game", name), Severity::Low);
                    self.peers.insert(subject, Peer { name, ready: false });
                    let n = self.ack_num;
                    self.ack_num = self.ack_num.wrapping_add(1);
                    n
                };
                self.ack(ack_n);
            }
            InfoEvent::Left => {
                let ack_n = match self.peers.remove(&subject) {
                    Some(peer) => {
                        self.notify(format!("{} left the game", peer.name), Severity::Low);
                        let n = self.ack_num;
                        self.ack_num = self.ack_num.wrapping_add(1);
                        n
                    }
                    None => {
                        debug!("leave for unknown player {}", subject);
                        self.ack_num.wrapping_sub(1)
                    }
                };
                self.ack(ack_n);
            }
            InfoEvent::Ready | InfoEvent::Unready => {
                let ready = event == InfoEvent::Ready;
                match self.peers.get_mut(&subject) {
                    Some(peer) => {
                        peer.ready = ready;
                        let text = if ready {
                            format!("{} is ready to play", peer.name)
                        } else {
                            format!("{} is not ready", peer.name)
                        };
                        self.notify(text, Severity::Low);
                    }
                    None => debug!("ready flag for unknown player {}", subject),
                }
            }
        }
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        self.disconnect();
        self.notify(
            format!("Disconnected from server: {}", reason),
            Severity::Critical,
        );
    }

    fn on_check(&mut self, word: String, valid: bool) {
        debug!("{} is {}valid", word, if valid { "" } else { "not " });
        self.dictionary.insert(word.clone(), valid);

        let requested = self.pending_request() == Some(RequestKind::Check)
            && self.lookup_words.keys().next() == Some(&word);
        if !requested {
            return;
        }
        if let Some(positions) = self.lookup_words.remove(&word) {
            if !valid {
                self.bad_words.insert(word, positions);
            }
        }
        if self.lookup_words.is_empty() {
            self.clear_pending();
            self.resolve_peel();
        } else {
            self.request_next_lookup();
        }
    }

    fn on_peel(&mut self, got: i16, remaining: i16, peeler: Option<SessionId>, letters: &str) {
        let expected = self.peel_n.wrapping_add(1);
        if got != expected {
            warn!("peel out of order: got {}, expecting {}", got, expected);
            self.ack(self.ack_num.wrapping_sub(1));
            return;
        }

        if self.pending_request() == Some(RequestKind::Peel) {
            self.clear_pending();
            self.waiting = false;
        }

        if got == 0 {
            if !self.playing {
                self.playing = true;
                self.started = true;
                self.notices.clear();
                self.notify("SPLIT!", Severity::High);
            }
            // the split restarts ack numbering for every player
            self.ack_num = 0;
        } else if let Some(id) = peeler.filter(|p| *p != self.session) {
            let name = self.peer_name(&id);
            self.notify(format!("{}: PEEL!", name), Severity::High);
        }

        self.peel_n = got;

        if usize::try_from(remaining).unwrap_or(0) < self.peers.len() + 1 {
            self.notify("Final peel!", Severity::High);
        } else {
            self.notify(format!("{} letters remain", remaining), Severity::Low);
        }

        debug!("received {} letters: {}", letters.len(), letters);
        if let Err(e) = self.hand.add_letters(letters) {
            warn!("peel letters: {}", e);
        }

        let ack_n = self.ack_num;
        self.ack_num = self.ack_num.wrapping_add(1);
        self.ack(ack_n);
    }

    fn on_dump(&mut self, dump_n: i16, letters: &str) {
        if self.pending_request() != Some(RequestKind::Dump) {
            debug!("received unexpected dump");
            return;
        }
        if dump_n != self.dump_n {
            debug!("got dump {} but expected {}", dump_n, self.dump_n);
            return;
        }
        if let Err(e) = self.hand.add_letters(letters) {
            warn!("dump letters: {}", e);
        }
        if letters.len() == 1 {
            self.notify("There are not enough tiles left to dump!", Severity::High);
        }
        self.clear_pending();
        self.waiting = false;
    }

    fn on_done(&mut self, winner: Option<SessionId>) {
        let ack_n = if self.playing {
            let text = match &winner {
                Some(id) if *id == self.session => "You win!".to_string(),
                Some(id) => format!("{} has won the game!", self.peer_name(id)),
                None if self.peers.is_empty() => {
                    "You win! All other players have resigned.".to_string()
                }
                None => "The game ended without a winner.".to_string(),
            };
            self.notify(text, Severity::Critical);
            self.game_over = true;
            self.winner = winner;
            let n = self.ack_num;
            self.ack_num = self.ack_num.wrapping_add(1);
            n
        } else {
            self.ack_num.wrapping_sub(1)
        };

        self.connected = false;
        self.playing = false;
        self.waiting = false;
        self.clear_pending();
        self.ack(ack_n);
    }
}
