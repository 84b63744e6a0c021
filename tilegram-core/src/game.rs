//! Authoritative game state: roster, bunch, peel and dump counters.
//!
//! The game moves from the lobby (joins and ready flags) to play (the peel
//! and dump cycle) to finished. It never touches the network; the server
//! decides when to peel, broadcast and shut down by asking [`Game::can_peel`],
//! [`Game::is_ready_to_finish`] and [`Game::can_shutdown`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::net::SocketAddr;

use log::{debug, info};

use crate::bunch::{Bunch, Multiplier};
use crate::grid::GridError;
use crate::hand::Hand;
use crate::identity::SessionId;
use crate::player::Player;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("unknown player {0}")]
    UnknownPlayer(SessionId),
    #[error("player {0} already joined")]
    DuplicatePlayer(SessionId),
    #[error("game is full")]
    Full,
    #[error("game already in progress")]
    InProgress,
    #[error("dump {got} out of sequence, expected {expected}")]
    DumpOutOfSequence { expected: i16, got: i16 },
    #[error("player does not hold {0}")]
    LetterNotHeld(char),
    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Debug)]
pub struct Game {
    bunch: Bunch,
    multiplier: Multiplier,
    player_limit: usize,
    players: BTreeMap<SessionId, Player>,
    /// Letters in play from a restored session that no player has claimed.
    restored: Hand,
    peel_number: i16,
    playing: bool,
    ready_to_peel: bool,
    waiting: bool,
    ready_to_finish: bool,
    finished: bool,
    pub winner: Option<SessionId>,
}

impl Game {
    pub fn new(multiplier: Multiplier, player_limit: usize) -> Self {
        Self::with_bunch(Bunch::new(multiplier), multiplier, player_limit)
    }

    /// Game around an existing bunch, e.g. a seeded one.
    pub fn with_bunch(bunch: Bunch, multiplier: Multiplier, player_limit: usize) -> Self {
        Self {
            bunch,
            multiplier,
            player_limit,
            players: BTreeMap::new(),
            restored: Hand::new(),
            peel_number: 0,
            playing: false,
            ready_to_peel: false,
            waiting: false,
            ready_to_finish: false,
            finished: false,
            winner: None,
        }
    }

    /// Game resumed from saved state: `allocated` letters are already on a
    /// board or in a hand and are left out of the bunch.
    pub fn restored(multiplier: Multiplier, player_limit: usize, allocated: Hand) -> Self {
        let bunch = Bunch::with_allocated(multiplier, allocated.counts());
        let mut game = Self::with_bunch(bunch, multiplier, player_limit);
        game.restored = allocated;
        game
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn player_limit(&self) -> usize {
        self.player_limit
    }

    pub fn players(&self) -> &BTreeMap<SessionId, Player> {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut BTreeMap<SessionId, Player> {
        &mut self.players
    }

    pub fn player(&self, id: &SessionId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &SessionId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn has_player(&self, id: &SessionId) -> bool {
        self.players.contains_key(id)
    }

    pub fn player_name(&self, id: &SessionId) -> Option<&str> {
        self.players.get(id).map(Player::name)
    }

    /// Tiles left in the bunch.
    pub fn remaining(&self) -> usize {
        self.bunch.size()
    }

    pub fn peel_number(&self) -> i16 {
        self.peel_number
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.player_limit
    }

    pub fn in_progress(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn can_peel(&self) -> bool {
        self.ready_to_peel && !self.waiting && !self.finished
    }

    /// True from the moment the game ends until [`Game::finish`] is called.
    pub fn is_ready_to_finish(&self) -> bool {
        self.ready_to_finish
    }

    /// Mark the game-over announcement as sent.
    pub fn finish(&mut self) {
        self.ready_to_finish = false;
    }

    pub fn can_shutdown(&self) -> bool {
        self.finished && !self.waiting
    }

    /// Note that a critical packet is outstanding.
    pub fn wait(&mut self) {
        self.waiting = true;
    }

    /// Clear `waiting` once no player has an unacknowledged packet.
    pub fn check_waiting(&mut self) {
        if self.players.values().all(|p| !p.has_pending()) {
            self.waiting = false;
        }
    }

    pub fn add_player(
        &mut self,
        id: SessionId,
        addr: SocketAddr,
        name: &str,
    ) -> Result<&mut Player, GameError> {
        if self.is_full() {
            return Err(GameError::Full);
        }
        if self.playing {
            return Err(GameError::InProgress);
        }
        match self.players.entry(id) {
            Entry::Occupied(e) => Err(GameError::DuplicatePlayer(e.key().clone())),
            Entry::Vacant(e) => {
                // newcomers start unready
                self.ready_to_peel = false;
                Ok(e.insert(Player::new(addr, name)))
            }
        }
    }

    /// Drop a player and return their letters to the bunch. Mid-game, fewer
    /// than two players ends the game; a lone survivor wins by default.
    pub fn remove_player(&mut self, id: &SessionId) -> Result<(), GameError> {
        let mut player = self
            .players
            .remove(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;
        for letter in player.hand_mut().drain() {
            self.bunch.add(letter);
        }

        if self.playing {
            if self.players.len() < 2 {
                info!("fewer than two players left, ending game");
                self.ready_to_finish = true;
                self.finished = true;
                self.winner = self.players.keys().next().cloned();
            }
        } else {
            self.try_to_start();
        }
        Ok(())
    }

    pub fn set_ready(&mut self, id: &SessionId, ready: bool) -> Result<(), GameError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;
        if self.playing {
            return Ok(());
        }
        player.ready = ready;
        if ready {
            self.try_to_start();
        } else {
            self.ready_to_peel = false;
        }
        Ok(())
    }

    fn try_to_start(&mut self) {
        if self.playing || self.players.is_empty() {
            return;
        }
        if self.player_limit > 1 && self.players.len() < 2 {
            return;
        }
        if self.players.values().all(|p| p.ready) {
            self.ready_to_peel = true;
        }
    }

    /// Arm the next peel if `requested` names the current round. In the
    /// lobby only ready flags can arm the opening split.
    pub fn check_peel(&mut self, requested: i16) -> bool {
        if self.playing && requested == self.peel_number {
            self.ready_to_peel = true;
        }
        self.ready_to_peel
    }

    /// Whether `dump_n` is the player's next dump or a retry of the last one.
    pub fn check_dump(&self, id: &SessionId, dump_n: i16) -> bool {
        self.players.get(id).is_some_and(|p| {
            dump_n == p.dump_n() || dump_n == p.dump_n().wrapping_sub(1)
        })
    }

    /// Deal a peel round. Returns `true` if the bunch cannot cover it, in
    /// which case the game is over and the bunch is left untouched.
    pub fn peel(&mut self) -> bool {
        let first = self.peel_number == 0;
        let per_player = if first {
            self.multiplier.initial_hand(self.players.len())
        } else {
            1
        };
        if self.bunch.size() < self.players.len().saturating_mul(per_player) {
            info!(
                "bunch has {} tiles, {} players need {} each: game over",
                self.bunch.size(),
                self.players.len(),
                per_player
            );
            self.ready_to_finish = true;
            self.finished = true;
            return true;
        }

        self.ready_to_peel = false;
        self.peel_number = self.peel_number.wrapping_add(1);
        if first {
            self.playing = true;
            for player in self.players.values_mut() {
                player.reset_ack();
            }
        }

        for player in self.players.values_mut() {
            let letters = self.bunch.take_many(per_player);
            // bunch letters are always A..=Z
            if let Err(e) = player.give_peel(&letters) {
                debug!("peel for {} skipped: {}", player.name(), e);
            }
        }
        false
    }

    /// Exchange `letter` for three from the bunch. A retry of the previous
    /// dump number gets the recorded answer again without drawing. When
    /// fewer than three tiles remain the dump is refused and the answer is
    /// `letter` alone.
    pub fn dump(&mut self, id: &SessionId, dump_n: i16, letter: char) -> Result<String, GameError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;

        if dump_n == player.dump_n().wrapping_sub(1) {
            return Ok(player.last_dump().to_string());
        }
        if dump_n != player.dump_n() {
            return Err(GameError::DumpOutOfSequence {
                expected: player.dump_n(),
                got: dump_n,
            });
        }

        if self.bunch.size() < 3 {
            player.refuse_dump(letter);
            return Ok(letter.to_string());
        }

        if player.hand_mut().take(letter).is_none() && self.restored.take(letter).is_none() {
            return Err(GameError::LetterNotHeld(letter));
        }
        let letters = self.bunch.take_many(3);
        player.give_dump(&letters)?;
        self.bunch.add(letter);
        Ok(letters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bunch::LETTER_COUNTS;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn id(s: &str) -> SessionId {
        SessionId::from(s)
    }

    fn game_with(players: &[&str]) -> Game {
        let mut game = Game::with_bunch(Bunch::seeded(Multiplier::FULL, 5), Multiplier::FULL, 8);
        for (i, p) in players.iter().enumerate() {
            game.add_player(id(p), addr(5000 + i as u16), p).unwrap();
        }
        game
    }

    /// Bunch holding exactly `size` vowels, at most 54.
    fn small_bunch(size: u32) -> Bunch {
        let mut allocated = LETTER_COUNTS;
        let mut left = size;
        for i in [4, 0, 8, 14] {
            let n = left.min(allocated[i]);
            allocated[i] -= n;
            left -= n;
        }
        assert_eq!(left, 0);
        Bunch::with_allocated(Multiplier::FULL, &allocated)
    }

    fn start(game: &mut Game) {
        let ids: Vec<_> = game.players().keys().cloned().collect();
        for p in &ids {
            game.set_ready(p, true).unwrap();
        }
        assert!(game.can_peel());
        assert!(!game.peel());
    }

    #[test]
    fn all_ready_arms_first_peel() {
        let mut game = game_with(&["a", "b"]);
        game.set_ready(&id("a"), true).unwrap();
        assert!(!game.can_peel());
        game.set_ready(&id("b"), true).unwrap();
        assert!(game.can_peel());
        game.set_ready(&id("b"), false).unwrap();
        assert!(!game.can_peel());
    }

    #[test]
    fn lone_player_needs_single_player_limit() {
        let mut game = game_with(&["a"]);
        game.set_ready(&id("a"), true).unwrap();
        assert!(!game.can_peel());

        let mut solo = Game::with_bunch(Bunch::seeded(Multiplier::FULL, 1), Multiplier::FULL, 1);
        solo.add_player(id("a"), addr(1), "a").unwrap();
        solo.set_ready(&id("a"), true).unwrap();
        assert!(solo.can_peel());
    }

    #[test]
    fn join_rejections() {
        let mut game = Game::with_bunch(Bunch::seeded(Multiplier::FULL, 1), Multiplier::FULL, 2);
        game.add_player(id("a"), addr(1), "a").unwrap();
        assert_eq!(
            game.add_player(id("a"), addr(1), "a").unwrap_err(),
            GameError::DuplicatePlayer(id("a"))
        );
        game.add_player(id("b"), addr(2), "b").unwrap();
        assert_eq!(game.add_player(id("c"), addr(3), "c").unwrap_err(), GameError::Full);

        let mut game = game_with(&["a", "b"]);
        start(&mut game);
        assert_eq!(game.add_player(id("c"), addr(3), "c").unwrap_err(), GameError::InProgress);
    }

    #[test]
    fn first_peel_deals_initial_hands() {
        let mut game = game_with(&["a", "b"]);
        start(&mut game);
        assert!(game.in_progress());
        assert_eq!(game.peel_number(), 1);
        for p in game.players().values() {
            assert_eq!(p.hand().len(), 21);
            assert_eq!(p.last_peel().len(), 21);
        }
        assert_eq!(game.remaining(), 144 - 42);
        assert!(!game.can_peel());
    }

    #[test]
    fn later_peels_deal_one_each() {
        let mut game = game_with(&["a", "b", "c"]);
        start(&mut game);
        assert!(!game.check_peel(0));
        assert!(game.check_peel(1));
        assert!(!game.peel());
        assert_eq!(game.peel_number(), 2);
        assert_eq!(game.remaining(), 144 - 63 - 3);
        for p in game.players().values() {
            assert_eq!(p.last_peel().len(), 1);
            assert_eq!(p.hand().len(), 22);
        }
    }

    #[test]
    fn peel_short_by_one_ends_game_untouched() {
        let mut game = Game::with_bunch(small_bunch(43), Multiplier::FULL, 8);
        game.add_player(id("a"), addr(1), "a").unwrap();
        game.add_player(id("b"), addr(2), "b").unwrap();
        start(&mut game);
        assert_eq!(game.remaining(), 1);

        game.check_peel(1);
        assert!(game.peel());
        assert_eq!(game.remaining(), 1);
        assert!(game.is_finished());
        assert!(game.is_ready_to_finish());
        assert_eq!(game.peel_number(), 1);
        assert!(!game.can_peel());
    }

    #[test]
    fn opening_peel_needs_full_hands() {
        let mut game = Game::with_bunch(small_bunch(41), Multiplier::FULL, 8);
        game.add_player(id("a"), addr(1), "a").unwrap();
        game.add_player(id("b"), addr(2), "b").unwrap();
        game.set_ready(&id("a"), true).unwrap();
        game.set_ready(&id("b"), true).unwrap();
        assert!(game.peel());
        assert_eq!(game.remaining(), 41);
        assert!(!game.in_progress());
    }

    #[test]
    fn dump_retry_is_idempotent() {
        let mut game = game_with(&["a", "b"]);
        start(&mut game);
        let letter = game.player(&id("a")).unwrap().hand().letters().next().unwrap();
        let before = game.remaining();

        let first = game.dump(&id("a"), 0, letter).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(game.remaining(), before - 2);

        let again = game.dump(&id("a"), 0, letter).unwrap();
        assert_eq!(again, first);
        assert_eq!(game.remaining(), before - 2);
        assert_eq!(game.player(&id("a")).unwrap().hand().len(), 23);

        assert!(game.check_dump(&id("a"), 1));
        assert!(game.check_dump(&id("a"), 0));
        assert!(!game.check_dump(&id("a"), 2));
        assert_eq!(
            game.dump(&id("a"), 2, letter).unwrap_err(),
            GameError::DumpOutOfSequence { expected: 1, got: 2 }
        );
    }

    #[test]
    fn dump_refused_when_bunch_low() {
        let mut game = Game::with_bunch(small_bunch(44), Multiplier::FULL, 8);
        game.add_player(id("a"), addr(1), "a").unwrap();
        game.add_player(id("b"), addr(2), "b").unwrap();
        start(&mut game);
        assert_eq!(game.remaining(), 2);

        assert_eq!(game.dump(&id("a"), 0, 'E').unwrap(), "E");
        assert_eq!(game.remaining(), 2);
        assert_eq!(game.player(&id("a")).unwrap().dump_n(), 1);
        assert_eq!(game.dump(&id("a"), 0, 'E').unwrap(), "E");
    }

    #[test]
    fn dump_requires_held_letter() {
        let mut game = Game::with_bunch(small_bunch(50), Multiplier::FULL, 8);
        game.add_player(id("a"), addr(1), "a").unwrap();
        game.add_player(id("b"), addr(2), "b").unwrap();
        start(&mut game);
        // the bunch only holds vowels
        assert_eq!(game.dump(&id("a"), 0, 'Z').unwrap_err(), GameError::LetterNotHeld('Z'));
        assert_eq!(game.player(&id("a")).unwrap().dump_n(), 0);
    }

    #[test]
    fn restored_letters_can_be_dumped() {
        let mut allocated = Hand::new();
        allocated.add_letters("QQ").unwrap();
        let mut game = Game::restored(Multiplier::FULL, 1, allocated);
        assert_eq!(game.remaining(), 142);
        game.add_player(id("a"), addr(1), "a").unwrap();
        game.set_ready(&id("a"), true).unwrap();
        assert!(!game.peel());
        let held_q = game.player(&id("a")).unwrap().hand().count('Q');
        // two restored Qs plus whatever the opening hand dealt
        for n in 0..(held_q as i16 + 2) {
            assert_eq!(game.dump(&id("a"), n, 'Q').unwrap().len(), 3);
        }
    }

    #[test]
    fn leaving_mid_game_ends_it() {
        let mut game = game_with(&["a", "b"]);
        start(&mut game);
        let before = game.remaining();
        game.remove_player(&id("b")).unwrap();
        assert_eq!(game.remaining(), before + 21);
        assert!(game.is_finished());
        assert!(game.is_ready_to_finish());
        assert_eq!(game.winner, Some(id("a")));
        assert!(game.can_shutdown());
        game.finish();
        assert!(!game.is_ready_to_finish());
    }

    #[test]
    fn leaving_lobby_can_start_game() {
        let mut game = game_with(&["a", "b", "c"]);
        game.set_ready(&id("a"), true).unwrap();
        game.set_ready(&id("b"), true).unwrap();
        assert!(!game.can_peel());
        game.remove_player(&id("c")).unwrap();
        assert!(game.can_peel());
        assert_eq!(
            game.remove_player(&id("c")).unwrap_err(),
            GameError::UnknownPlayer(id("c"))
        );
    }

    #[test]
    fn waiting_blocks_peel_until_all_acked() {
        let mut game = game_with(&["a", "b"]);
        game.set_ready(&id("a"), true).unwrap();
        game.set_ready(&id("b"), true).unwrap();
        game.player_mut(&id("a")).unwrap().add_pending(vec![1]);
        game.wait();
        assert!(!game.can_peel());
        game.check_waiting();
        assert!(!game.can_peel());
        game.player_mut(&id("a")).unwrap().acknowledged(0);
        game.check_waiting();
        assert!(game.can_peel());
    }
}
