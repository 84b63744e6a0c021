//! Letter pool: a finite shuffled multiset, or an endless draw weighted by tile frequency.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Base tile count per letter, `A` through `Z` (144 tiles).
pub const LETTER_COUNTS: [u32; 26] = [
    13, 3, 3, 6, 18, 3, 4, 3, 12, 2, 2, 5, 3, 8, 11, 3, 2, 9, 6, 9, 6, 3, 3, 2, 3, 2,
];

/// Index of an uppercase letter into per-letter tables.
pub fn letter_index(letter: char) -> Option<usize> {
    if letter.is_ascii_uppercase() {
        Some(letter as usize - 'A' as usize)
    } else {
        None
    }
}

/// Inverse of [`letter_index`]. `index` must be below 26.
pub fn index_letter(index: usize) -> char {
    debug_assert!(index < 26);
    (b'A' + index as u8) as char
}

/// Bunch size multiplier as a fraction. A zero denominator means an endless bunch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplier {
    pub num: u8,
    pub den: u8,
}

impl Multiplier {
    pub const FULL: Multiplier = Multiplier { num: 1, den: 1 };
    pub const HALF: Multiplier = Multiplier { num: 1, den: 2 };
    pub const ENDLESS: Multiplier = Multiplier { num: 1, den: 0 };

    pub fn new(num: u8, den: u8) -> Self {
        Self { num, den }
    }

    pub fn is_endless(&self) -> bool {
        self.den == 0
    }

    /// Largest roster this bunch can deal an opening hand to.
    pub fn max_players(&self) -> usize {
        let num = self.num as usize;
        match self.den {
            0 => 8 * num,
            den => (8 * num) / den as usize,
        }
    }

    /// Opening hand size, tiered by headcount relative to bunch size.
    pub fn initial_hand(&self, players: usize) -> usize {
        let scaled = players * self.den as usize;
        let num = self.num as usize;
        if scaled <= 4 * num {
            21
        } else if scaled <= 6 * num {
            15
        } else {
            11
        }
    }

    /// Tiles of each letter in a bunch built with this multiplier.
    pub fn letter_counts(&self) -> [u32; 26] {
        let mut counts = [0u32; 26];
        if self.den == 0 {
            return counts;
        }
        for (count, base) in counts.iter_mut().zip(LETTER_COUNTS) {
            *count = (base * self.num as u32) / self.den as u32;
        }
        counts
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::FULL
    }
}

impl FromStr for Multiplier {
    type Err = MultiplierError;

    /// Accepts `0.5` or a positive integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "0.5" {
            return Ok(Self::HALF);
        }
        match s.parse::<u8>() {
            Ok(n) if n >= 1 => Ok(Self { num: n, den: 1 }),
            _ => Err(MultiplierError(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid bunch multiplier {0:?}: expected 0.5 or a positive integer")]
pub struct MultiplierError(String);

/// Finite pool drawn without replacement. Tiles are inserted at random
/// positions and drawn from the back, so the pool never needs a full reshuffle.
#[derive(Debug)]
pub struct FiniteBunch {
    tiles: Vec<char>,
    rng: StdRng,
}

impl FiniteBunch {
    /// `allocated` holds per-letter counts already in play (hands and grids)
    /// that must not be put back into the pool.
    pub fn new(multiplier: Multiplier, allocated: Option<&[u32; 26]>, rng: StdRng) -> Self {
        let mut bunch = Self {
            tiles: Vec::new(),
            rng,
        };
        let counts = multiplier.letter_counts();
        for (i, &count) in counts.iter().enumerate() {
            let in_play = allocated.map_or(0, |a| a[i]);
            for _ in 0..count.saturating_sub(in_play) {
                bunch.add(index_letter(i));
            }
        }
        bunch
    }

    pub fn size(&self) -> usize {
        self.tiles.len()
    }

    pub fn add(&mut self, letter: char) {
        let pos = self.rng.gen_range(0..=self.tiles.len());
        self.tiles.insert(pos, letter);
    }

    pub fn take(&mut self) -> Option<char> {
        self.tiles.pop()
    }
}

/// Endless pool: every draw is independent, weighted by [`LETTER_COUNTS`].
#[derive(Debug)]
pub struct InfiniteBunch {
    total: u32,
    rng: StdRng,
}

impl InfiniteBunch {
    pub fn new(rng: StdRng) -> Self {
        Self {
            total: LETTER_COUNTS.iter().sum(),
            rng,
        }
    }

    pub fn take(&mut self) -> char {
        let mut roll = self.rng.gen_range(0..self.total);
        for (i, &weight) in LETTER_COUNTS.iter().enumerate() {
            if roll < weight {
                return index_letter(i);
            }
            roll -= weight;
        }
        index_letter(25)
    }
}

/// The shared tile pool, finite or endless; chosen once at construction.
#[derive(Debug)]
pub enum Bunch {
    Finite(FiniteBunch),
    Infinite(InfiniteBunch),
}

impl Bunch {
    pub fn new(multiplier: Multiplier) -> Self {
        Self::build(multiplier, None, StdRng::from_entropy())
    }

    /// Rebuild a finite pool around letters already held by players.
    pub fn with_allocated(multiplier: Multiplier, allocated: &[u32; 26]) -> Self {
        Self::build(multiplier, Some(allocated), StdRng::from_entropy())
    }

    /// Deterministic pool for tests and replays.
    pub fn seeded(multiplier: Multiplier, seed: u64) -> Self {
        Self::build(multiplier, None, StdRng::seed_from_u64(seed))
    }

    fn build(multiplier: Multiplier, allocated: Option<&[u32; 26]>, rng: StdRng) -> Self {
        if multiplier.is_endless() {
            Bunch::Infinite(InfiniteBunch::new(rng))
        } else {
            Bunch::Finite(FiniteBunch::new(multiplier, allocated, rng))
        }
    }

    /// Tiles left. An endless bunch reports `usize::MAX`.
    pub fn size(&self) -> usize {
        match self {
            Bunch::Finite(b) => b.size(),
            Bunch::Infinite(_) => usize::MAX,
        }
    }

    /// Return a tile to the pool. No-op for an endless bunch.
    pub fn add(&mut self, letter: char) {
        if let Bunch::Finite(b) = self {
            b.add(letter);
        }
    }

    /// Draw one tile. `None` only when a finite pool is empty; callers check
    /// [`Bunch::size`] first.
    pub fn take(&mut self) -> Option<char> {
        match self {
            Bunch::Finite(b) => b.take(),
            Bunch::Infinite(b) => Some(b.take()),
        }
    }

    /// Draw `n` tiles into a string, stopping early if the pool runs dry.
    pub fn take_many(&mut self, n: usize) -> String {
        (0..n).map_while(|_| self.take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bunch_drains_to_base_counts() {
        let mut bunch = Bunch::seeded(Multiplier::FULL, 7);
        let total: u32 = LETTER_COUNTS.iter().sum();
        assert_eq!(bunch.size(), total as usize);

        let mut drawn = [0u32; 26];
        while let Some(letter) = bunch.take() {
            drawn[letter_index(letter).unwrap()] += 1;
        }
        assert_eq!(drawn, LETTER_COUNTS);
        assert_eq!(bunch.size(), 0);
        assert_eq!(bunch.take(), None);
    }

    #[test]
    fn half_bunch_rounds_each_letter_down() {
        let bunch = Bunch::seeded(Multiplier::HALF, 1);
        let expected: u32 = LETTER_COUNTS.iter().map(|c| c / 2).sum();
        assert_eq!(bunch.size(), expected as usize);
        assert_eq!(bunch.size(), 65);
    }

    #[test]
    fn allocated_letters_are_subtracted() {
        let mut allocated = [0u32; 26];
        allocated[0] = 3; // A
        allocated[25] = 5; // more Z than exist
        let mut bunch = Bunch::with_allocated(Multiplier::FULL, &allocated);
        assert_eq!(bunch.size(), 144 - 3 - 2);

        let mut drawn = [0u32; 26];
        while let Some(letter) = bunch.take() {
            drawn[letter_index(letter).unwrap()] += 1;
        }
        assert_eq!(drawn[0], 10);
        assert_eq!(drawn[25], 0);
    }

    #[test]
    fn add_returns_tile_to_pool() {
        let mut bunch = Bunch::seeded(Multiplier::FULL, 3);
        let letter = bunch.take().unwrap();
        assert_eq!(bunch.size(), 143);
        bunch.add(letter);
        assert_eq!(bunch.size(), 144);
    }

    #[test]
    fn endless_bunch_never_runs_out() {
        let mut bunch = Bunch::seeded(Multiplier::ENDLESS, 11);
        assert_eq!(bunch.size(), usize::MAX);
        for _ in 0..1000 {
            assert!(bunch.take().unwrap().is_ascii_uppercase());
        }
        bunch.add('Q');
        assert_eq!(bunch.size(), usize::MAX);
    }

    #[test]
    fn take_many_stops_at_empty() {
        let mut allocated = LETTER_COUNTS;
        allocated[4] -= 2; // leave two Es
        let mut bunch = Bunch::with_allocated(Multiplier::FULL, &allocated);
        assert_eq!(bunch.take_many(3), "EE");
    }

    #[test]
    fn multiplier_parsing() {
        assert_eq!("0.5".parse::<Multiplier>().unwrap(), Multiplier::HALF);
        assert_eq!("2".parse::<Multiplier>().unwrap(), Multiplier::new(2, 1));
        assert!("0".parse::<Multiplier>().is_err());
        assert!("1.5".parse::<Multiplier>().is_err());
        assert!("abc".parse::<Multiplier>().is_err());
    }

    #[test]
    fn initial_hand_tiers() {
        let full = Multiplier::FULL;
        assert_eq!(full.initial_hand(2), 21);
        assert_eq!(full.initial_hand(4), 21);
        assert_eq!(full.initial_hand(5), 15);
        assert_eq!(full.initial_hand(6), 15);
        assert_eq!(full.initial_hand(8), 11);

        let half = Multiplier::HALF;
        assert_eq!(half.initial_hand(2), 21);
        assert_eq!(half.initial_hand(3), 15);
        assert_eq!(half.initial_hand(4), 11);
        assert_eq!(half.max_players(), 4);
        assert_eq!(full.max_players(), 8);
    }
}
