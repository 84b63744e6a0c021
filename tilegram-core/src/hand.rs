//! A player's unplaced letters, kept as per-letter counts.

use crate::bunch::{index_letter, letter_index};
use crate::grid::{GridError, Tile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hand {
    counts: [u32; 26],
}

impl Hand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: [u32; 26]) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[u32; 26] {
        &self.counts
    }

    pub fn count(&self, letter: char) -> u32 {
        letter_index(letter).map_or(0, |i| self.counts[i])
    }

    pub fn has_any(&self, letter: char) -> bool {
        self.count(letter) > 0
    }

    pub fn len(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn add(&mut self, tile: Tile) {
        if let Some(i) = letter_index(tile.letter()) {
            self.counts[i] += 1;
        }
    }

    pub fn add_letter(&mut self, letter: char) -> Result<(), GridError> {
        self.add(Tile::new(letter)?);
        Ok(())
    }

    /// Add every letter of `letters`, stopping at the first invalid one.
    pub fn add_letters(&mut self, letters: &str) -> Result<(), GridError> {
        letters.chars().try_for_each(|c| self.add_letter(c))
    }

    /// Take one tile of `letter` out of the hand.
    pub fn take(&mut self, letter: char) -> Option<Tile> {
        let i = letter_index(letter)?;
        if self.counts[i] == 0 {
            return None;
        }
        self.counts[i] -= 1;
        Tile::new(letter).ok()
    }

    /// Letters in alphabetical order, one per tile.
    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.counts
            .iter()
            .enumerate()
            .flat_map(|(i, &c)| std::iter::repeat(index_letter(i)).take(c as usize))
    }

    /// Empty the hand, returning its letters.
    pub fn drain(&mut self) -> Vec<char> {
        let letters = self.letters().collect();
        self.counts = [0; 26];
        letters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_take() {
        let mut hand = Hand::new();
        hand.add_letters("BANANA").unwrap();
        assert_eq!(hand.len(), 6);
        assert_eq!(hand.count('A'), 3);
        assert_eq!(hand.take('N').unwrap().letter(), 'N');
        assert_eq!(hand.count('N'), 1);
        assert!(hand.take('Z').is_none());
        assert_eq!(hand.letters().collect::<String>(), "AAABN");
    }

    #[test]
    fn invalid_letter_stops_adding() {
        let mut hand = Hand::new();
        assert!(hand.add_letters("AB?C").is_err());
        assert_eq!(hand.len(), 2);
    }

    #[test]
    fn drain_empties() {
        let mut hand = Hand::new();
        hand.add_letters("QI").unwrap();
        assert_eq!(hand.drain(), vec!['I', 'Q']);
        assert!(hand.is_empty());
    }
}
