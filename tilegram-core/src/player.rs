//! Server-side player record and its reliable-delivery slot.
//!
//! Each player has at most one critical packet in flight. Further critical
//! packets wait in `pending` behind it and go out one at a time, each after
//! the previous one is acknowledged. The head is resent every poll interval
//! until acknowledged; a player silent past the ack timeout is dropped.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use crate::grid::GridError;
use crate::hand::Hand;

/// Resend interval for an unacknowledged critical packet.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a critical packet may go unacknowledged before the player is dropped.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Player {
    addr: SocketAddr,
    name: String,
    /// Every letter dealt to this player, placed or not. Returned to the
    /// bunch if the player leaves.
    hand: Hand,
    pub ready: bool,
    dump_n: i16,
    last_dump: String,
    last_peel: String,

    pending: VecDeque<Vec<u8>>,
    ack_count: i16,
    timeout: Duration,
    poll: Duration,
}

impl Player {
    pub fn new(addr: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            addr,
            name: name.into(),
            hand: Hand::new(),
            ready: false,
            dump_n: 0,
            last_dump: String::new(),
            last_peel: String::new(),
            pending: VecDeque::new(),
            ack_count: 0,
            timeout: Duration::ZERO,
            poll: Duration::ZERO,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hand(&self) -> &Hand {
        &self.hand
    }

    pub(crate) fn hand_mut(&mut self) -> &mut Hand {
        &mut self.hand
    }

    /// Next expected dump sequence number.
    pub fn dump_n(&self) -> i16 {
        self.dump_n
    }

    pub fn last_dump(&self) -> &str {
        &self.last_dump
    }

    /// Letters dealt in the latest peel.
    pub fn last_peel(&self) -> &str {
        &self.last_peel
    }

    pub fn give_peel(&mut self, letters: &str) -> Result<(), GridError> {
        self.hand.add_letters(letters)?;
        self.last_peel = letters.to_string();
        Ok(())
    }

    /// Record a fulfilled dump. The dumped letter must already be out of the hand.
    pub fn give_dump(&mut self, letters: &str) -> Result<(), GridError> {
        self.hand.add_letters(letters)?;
        self.record_dump(letters);
        Ok(())
    }

    /// Record a refused dump: the player keeps `letter`.
    pub fn refuse_dump(&mut self, letter: char) {
        self.record_dump(&letter.to_string());
    }

    fn record_dump(&mut self, answer: &str) {
        self.last_dump = answer.to_string();
        self.dump_n = self.dump_n.wrapping_add(1);
    }

    /// Queue a critical packet. Returns `true` if the queue was empty, in
    /// which case the caller sends it right away.
    pub fn add_pending(&mut self, packet: Vec<u8>) -> bool {
        let idle = self.pending.is_empty();
        if idle {
            self.timeout = Duration::ZERO;
            self.poll = Duration::ZERO;
        }
        self.pending.push_back(packet);
        idle
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Packet currently awaiting acknowledgement.
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.front().map(Vec::as_slice)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn step(&mut self, elapsed: Duration) {
        self.timeout += elapsed;
        self.poll += elapsed;
    }

    pub fn timed_out(&self, limit: Duration) -> bool {
        self.timeout > limit
    }

    /// Whether the head packet is due for a resend; consumes one interval if so.
    pub fn resend_due(&mut self, interval: Duration) -> bool {
        if self.poll > interval {
            self.poll -= interval;
            true
        } else {
            false
        }
    }

    /// Apply an acknowledgement. Only the expected number pops the head.
    pub fn acknowledged(&mut self, ack_n: i16) -> bool {
        if ack_n != self.ack_count || self.pending.pop_front().is_none() {
            return false;
        }
        self.ack_count = self.ack_count.wrapping_add(1);
        self.timeout = Duration::ZERO;
        self.poll = Duration::ZERO;
        true
    }

    pub fn ack_count(&self) -> i16 {
        self.ack_count
    }

    /// Restart ack numbering. Used at the opening peel, when the queue is empty.
    pub fn reset_ack(&mut self) {
        self.ack_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new("127.0.0.1:4000".parse().unwrap(), "ann")
    }

    #[test]
    fn first_pending_is_sent_immediately() {
        let mut p = player();
        assert!(p.add_pending(vec![1]));
        assert!(!p.add_pending(vec![2]));
        assert_eq!(p.pending(), Some(&[1u8][..]));
        assert_eq!(p.pending_len(), 2);
    }

    #[test]
    fn ack_must_match_count() {
        let mut p = player();
        p.add_pending(vec![1]);
        p.add_pending(vec![2]);
        assert!(!p.acknowledged(1));
        assert_eq!(p.pending_len(), 2);
        assert!(p.acknowledged(0));
        assert_eq!(p.pending(), Some(&[2u8][..]));
        assert!(!p.acknowledged(0));
        assert!(p.acknowledged(1));
        assert!(!p.has_pending());
        assert_eq!(p.ack_count(), 2);
    }

    #[test]
    fn ack_with_empty_queue_is_ignored() {
        let mut p = player();
        assert!(!p.acknowledged(0));
        assert_eq!(p.ack_count(), 0);
    }

    #[test]
    fn resend_and_timeout_timers() {
        let mut p = player();
        p.add_pending(vec![1]);
        p.step(Duration::from_millis(400));
        assert!(!p.resend_due(POLL_INTERVAL));
        p.step(Duration::from_millis(200));
        assert!(p.resend_due(POLL_INTERVAL));
        assert!(!p.resend_due(POLL_INTERVAL));

        p.step(Duration::from_millis(4400));
        assert!(!p.timed_out(ACK_TIMEOUT));
        p.step(Duration::from_millis(1));
        assert!(p.timed_out(ACK_TIMEOUT));

        assert!(p.acknowledged(0));
        assert!(!p.timed_out(ACK_TIMEOUT));
    }

    #[test]
    fn dump_bookkeeping() {
        let mut p = player();
        p.give_peel("ABC").unwrap();
        assert_eq!(p.last_peel(), "ABC");
        p.hand_mut().take('A');
        p.give_dump("XYZ").unwrap();
        assert_eq!(p.dump_n(), 1);
        assert_eq!(p.last_dump(), "XYZ");
        assert_eq!(p.hand().len(), 5);

        p.refuse_dump('B');
        assert_eq!(p.dump_n(), 2);
        assert_eq!(p.last_dump(), "B");
        assert_eq!(p.hand().len(), 5);
    }
}
