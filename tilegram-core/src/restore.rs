//! Saved single-player sessions.
//!
//! Layout: the dictionary file name and a NUL, one byte each for the bunch
//! numerator and denominator, `(letter, count)` byte pairs for the hand closed
//! by a NUL, then `(letter, x, y)` for every placed tile with `x` and `y` as
//! little-endian `i32` until the end of the buffer.

use std::fs;
use std::path::Path;

use crate::bunch::{index_letter, Multiplier};
use crate::game::Game;
use crate::grid::{Grid, GridError, Pos, Tile};
use crate::hand::Hand;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("save data ends early")]
    Truncated,
    #[error("dictionary name is not terminated")]
    MissingTerminator,
    #[error("invalid letter byte {0:#04x}")]
    InvalidLetter(u8),
    #[error("dictionary name is not valid utf-8")]
    InvalidUtf8,
    #[error("grid: {0}")]
    Grid(#[from] GridError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGame {
    pub dictionary: String,
    pub multiplier: Multiplier,
    pub hand: Hand,
    pub tiles: Vec<(char, Pos)>,
}

fn letter(byte: u8) -> Result<char, RestoreError> {
    if byte.is_ascii_uppercase() {
        Ok(byte as char)
    } else {
        Err(RestoreError::InvalidLetter(byte))
    }
}

fn read_i32(buf: &[u8], at: usize) -> Result<i32, RestoreError> {
    let bytes = buf.get(at..at + 4).ok_or(RestoreError::Truncated)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(i32::from_le_bytes(raw))
}

impl SavedGame {
    /// Snapshot a player's board. Tiles are ordered by position.
    pub fn capture(dictionary: &str, multiplier: Multiplier, hand: &Hand, grid: &Grid) -> Self {
        let mut tiles: Vec<(char, Pos)> = grid.tiles().map(|t| (t.letter(), t.pos())).collect();
        tiles.sort_by_key(|&(_, p)| (p.y, p.x));
        Self {
            dictionary: dictionary.to_string(),
            multiplier,
            hand: hand.clone(),
            tiles,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.dictionary.len() + 4 + self.tiles.len() * 9);
        out.extend_from_slice(self.dictionary.as_bytes());
        out.push(0);
        out.push(self.multiplier.num);
        out.push(self.multiplier.den);

        for (i, &count) in self.hand.counts().iter().enumerate() {
            let mut left = count;
            while left > 0 {
                let chunk = left.min(u32::from(u8::MAX));
                out.push(index_letter(i) as u8);
                out.push(chunk as u8);
                left -= chunk;
            }
        }
        out.push(0);

        for &(letter, pos) in &self.tiles {
            out.push(letter as u8);
            out.extend_from_slice(&pos.x.to_le_bytes());
            out.extend_from_slice(&pos.y.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, RestoreError> {
        let nul = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(RestoreError::MissingTerminator)?;
        let dictionary = std::str::from_utf8(&buf[..nul])
            .map_err(|_| RestoreError::InvalidUtf8)?
            .to_string();
        let mut at = nul + 1;
        let params = buf.get(at..at + 2).ok_or(RestoreError::Truncated)?;
        let multiplier = Multiplier::new(params[0], params[1]);
        at += 2;

        let mut hand = Hand::new();
        loop {
            let &byte = buf.get(at).ok_or(RestoreError::Truncated)?;
            at += 1;
            if byte == 0 {
                break;
            }
            let ch = letter(byte)?;
            let &count = buf.get(at).ok_or(RestoreError::Truncated)?;
            at += 1;
            for _ in 0..count {
                hand.add_letter(ch)?;
            }
        }

        let mut tiles = Vec::new();
        while at < buf.len() {
            let ch = letter(buf[at])?;
            let x = read_i32(buf, at + 1)?;
            let y = read_i32(buf, at + 5)?;
            tiles.push((ch, Pos::new(x, y)));
            at += 9;
        }

        Ok(Self {
            dictionary,
            multiplier,
            hand,
            tiles,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RestoreError> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RestoreError> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Rebuild the board. A later tile at the same position replaces an earlier one.
    pub fn grid(&self) -> Result<Grid, GridError> {
        let mut grid = Grid::new();
        for &(letter, pos) in &self.tiles {
            grid.swap(pos.x, pos.y, Tile::new(letter)?);
        }
        Ok(grid)
    }

    /// Every letter this player holds, in hand or on the board.
    pub fn allocated(&self) -> Hand {
        let mut counts = *self.hand.counts();
        for (i, placed) in self.grid_counts().iter().enumerate() {
            counts[i] += placed;
        }
        Hand::from_counts(counts)
    }

    fn grid_counts(&self) -> [u32; 26] {
        let mut counts = [0u32; 26];
        for &(letter, _) in &self.tiles {
            if let Some(i) = crate::bunch::letter_index(letter) {
                counts[i] += 1;
            }
        }
        counts
    }

    /// Server-side game whose bunch excludes the restored letters.
    pub fn game(&self, player_limit: usize) -> Game {
        Game::restored(self.multiplier, player_limit, self.allocated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SavedGame {
        let mut hand = Hand::new();
        hand.add_letters("QEE").unwrap();
        let mut grid = Grid::new();
        grid.swap(0, 0, Tile::new('C').unwrap());
        grid.swap(1, 0, Tile::new('A').unwrap());
        grid.swap(-2, 3, Tile::new('T').unwrap());
        SavedGame::capture("dict.txt", Multiplier::HALF, &hand, &grid)
    }

    #[test]
    fn byte_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[..9], b"dict.txt\0");
        assert_eq!(&bytes[9..11], &[1, 2]);
        assert_eq!(&bytes[11..16], &[b'E', 2, b'Q', 1, 0]);
        assert_eq!(bytes[16], b'C');
        assert_eq!(&bytes[17..25], &[0, 0, 0, 0, 0, 0, 0, 0]);
        // (-2, 3) sorts last
        assert_eq!(bytes[34], b'T');
        assert_eq!(&bytes[35..39], &(-2i32).to_le_bytes());
        assert_eq!(bytes.len(), 16 + 3 * 9);
    }

    #[test]
    fn parse_restores_board() {
        let saved = SavedGame::from_bytes(&sample().to_bytes()).unwrap();
        assert_eq!(saved, sample());
        let grid = saved.grid().unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.get(-2, 3).unwrap().letter(), 'T');
        assert_eq!(saved.allocated().len(), 6);
    }

    #[test]
    fn file_save_and_load() {
        let path = std::env::temp_dir().join(format!("tilegram-save-{}.bin", std::process::id()));
        sample().save(&path).unwrap();
        let loaded = SavedGame::load(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.unwrap(), sample());

        assert!(matches!(
            SavedGame::load(path.with_extension("missing")),
            Err(RestoreError::Io(_))
        ));
    }

    #[test]
    fn large_counts_span_entries() {
        let mut counts = [0u32; 26];
        counts[4] = 300;
        let saved = SavedGame {
            dictionary: String::new(),
            multiplier: Multiplier::new(4, 1),
            hand: Hand::from_counts(counts),
            tiles: Vec::new(),
        };
        let bytes = saved.to_bytes();
        assert_eq!(&bytes[3..8], &[b'E', 255, b'E', 45, 0]);
        assert_eq!(SavedGame::from_bytes(&bytes).unwrap().hand.count('E'), 300);
    }

    #[test]
    fn rejects_damaged_data() {
        assert!(matches!(
            SavedGame::from_bytes(b"dict"),
            Err(RestoreError::MissingTerminator)
        ));
        assert!(matches!(
            SavedGame::from_bytes(b"d\0\x01"),
            Err(RestoreError::Truncated)
        ));
        assert!(matches!(
            SavedGame::from_bytes(b"d\0\x01\x01a\x01\0"),
            Err(RestoreError::InvalidLetter(b'a'))
        ));
        assert!(matches!(
            SavedGame::from_bytes(b"d\0\x01\x01\0C\0\0"),
            Err(RestoreError::Truncated)
        ));
        assert!(matches!(
            SavedGame::from_bytes(b"\xff\0\x01\x01\0"),
            Err(RestoreError::InvalidUtf8)
        ));
    }

    #[test]
    fn restored_game_excludes_allocated_letters() {
        let game = sample().game(4);
        let half: u32 = Multiplier::HALF.letter_counts().iter().sum();
        assert_eq!(game.remaining(), half as usize - 6);
    }
}
