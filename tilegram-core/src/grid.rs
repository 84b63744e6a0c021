//! Sparse letter grid with incrementally maintained word-start indexes.
//!
//! `hwords` holds every cell that has no left neighbour and an occupied right
//! neighbour (the first letter of a horizontal run of two or more); `vwords`
//! is the same for vertical runs. Both are patched locally on every
//! [`Grid::swap`] and [`Grid::remove`] rather than recomputed.
//!
//! Together, [`Grid::is_continuous`] and [`Grid::get_words`] form the move
//! validator: a play is legal iff the occupied cells are 4-connected and every
//! word they spell is in the dictionary.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Integer grid coordinate. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    fn step(self) -> (i32, i32) {
        match self {
            Orientation::Horizontal => (1, 0),
            Orientation::Vertical => (0, 1),
        }
    }
}

/// Where one occurrence of a word starts and which way it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordPos {
    pub x: i32,
    pub y: i32,
    pub orientation: Orientation,
}

impl WordPos {
    pub fn new(x: i32, y: i32, orientation: Orientation) -> Self {
        Self { x, y, orientation }
    }
}

/// Every word on the board, with all positions it occurs at.
pub type WordMap = BTreeMap<String, Vec<WordPos>>;

/// Visual state the UI layer renders a tile with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFlag {
    #[default]
    Normal,
    /// Disconnected from the main body, or part of a rejected word.
    Invalid,
    /// Matched a highlight request.
    Highlighted,
}

/// A single letter tile. Owned by exactly one container at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    letter: char,
    pos: Pos,
    marked: bool,
    pub flag: TileFlag,
}

impl Tile {
    /// Tiles carry uppercase ASCII letters only.
    pub fn new(letter: char) -> Result<Self, GridError> {
        if !letter.is_ascii_uppercase() {
            return Err(GridError::InvalidLetter(letter));
        }
        Ok(Self {
            letter,
            pos: Pos::default(),
            marked: false,
            flag: TileFlag::Normal,
        })
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Last grid position; meaningful only while placed.
    pub fn pos(&self) -> Pos {
        self.pos
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid tile letter {0:?}")]
    InvalidLetter(char),
}

#[derive(Debug, Default)]
pub struct Grid {
    tiles: HashMap<Pos, Tile>,
    hwords: BTreeSet<Pos>,
    vwords: BTreeSet<Pos>,
    bounds: Option<(Pos, Pos)>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&Tile> {
        self.tiles.get(&Pos::new(x, y))
    }

    fn occupied(&self, pos: Pos) -> bool {
        self.tiles.contains_key(&pos)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Inclusive bounding box `(min, max)`, or `None` when empty.
    pub fn bounds(&self) -> Option<(Pos, Pos)> {
        self.bounds
    }

    pub fn hwords(&self) -> &BTreeSet<Pos> {
        &self.hwords
    }

    pub fn vwords(&self) -> &BTreeSet<Pos> {
        &self.vwords
    }

    /// Place `tile` at `(x, y)` and return whatever occupied the cell.
    pub fn swap(&mut self, x: i32, y: i32, mut tile: Tile) -> Option<Tile> {
        let pos = Pos::new(x, y);
        tile.pos = pos;
        tile.marked = false;
        tile.flag = TileFlag::Normal;
        if let Some(previous) = self.tiles.insert(pos, tile) {
            // occupancy unchanged, indexes still hold
            return Some(previous);
        }

        self.bounds = Some(match self.bounds {
            None => (pos, pos),
            Some((min, max)) => (
                Pos::new(min.x.min(x), min.y.min(y)),
                Pos::new(max.x.max(x), max.y.max(y)),
            ),
        });

        self.link(pos, Orientation::Horizontal);
        self.link(pos, Orientation::Vertical);
        None
    }

    /// Clear `(x, y)` and return the tile that was there.
    pub fn remove(&mut self, x: i32, y: i32) -> Option<Tile> {
        let pos = Pos::new(x, y);
        let tile = self.tiles.remove(&pos)?;

        if let Some((min, max)) = self.bounds {
            if self.tiles.is_empty() {
                self.bounds = None;
            } else if x == min.x || x == max.x || y == min.y || y == max.y {
                self.recompute_bounds();
            }
        }

        self.unlink(pos, Orientation::Horizontal);
        self.unlink(pos, Orientation::Vertical);
        Some(tile)
    }

    fn starts_mut(&mut self, orientation: Orientation) -> &mut BTreeSet<Pos> {
        match orientation {
            Orientation::Horizontal => &mut self.hwords,
            Orientation::Vertical => &mut self.vwords,
        }
    }

    // Index upkeep after `pos` became occupied.
    fn link(&mut self, pos: Pos, orientation: Orientation) {
        let (dx, dy) = orientation.step();
        let before = pos.offset(-dx, -dy);
        let after = pos.offset(dx, dy);
        let has_before = self.occupied(before);
        let has_after = self.occupied(after);
        let has_two_before = self.occupied(pos.offset(-2 * dx, -2 * dy));

        let starts = self.starts_mut(orientation);
        if !has_before {
            if has_after {
                starts.insert(pos);
            }
        } else if !has_two_before {
            starts.insert(before);
        }
        if has_after {
            starts.remove(&after);
        }
    }

    // Index upkeep after `pos` became empty.
    fn unlink(&mut self, pos: Pos, orientation: Orientation) {
        let (dx, dy) = orientation.step();
        let before = pos.offset(-dx, -dy);
        let after = pos.offset(dx, dy);
        let before_was_start = self.occupied(before) && !self.occupied(pos.offset(-2 * dx, -2 * dy));
        let after_starts = self.occupied(after) && self.occupied(pos.offset(2 * dx, 2 * dy));

        let starts = self.starts_mut(orientation);
        starts.remove(&pos);
        if before_was_start {
            starts.remove(&before);
        }
        if after_starts {
            starts.insert(after);
        }
    }

    fn recompute_bounds(&mut self) {
        let mut keys = self.tiles.keys();
        self.bounds = keys.next().map(|&first| {
            keys.fold((first, first), |(min, max), p| {
                (
                    Pos::new(min.x.min(p.x), min.y.min(p.y)),
                    Pos::new(max.x.max(p.x), max.y.max(p.y)),
                )
            })
        });
    }

    /// Flood-fill from a word start over 4-connected tiles. Returns `false`
    /// when there is no word yet or any tile is unreachable; unreachable
    /// tiles are flagged [`TileFlag::Invalid`].
    pub fn is_continuous(&mut self) -> bool {
        for tile in self.tiles.values_mut() {
            tile.marked = false;
            if tile.flag == TileFlag::Invalid {
                tile.flag = TileFlag::Normal;
            }
        }

        let Some(&start) = self.hwords.iter().next().or_else(|| self.vwords.iter().next()) else {
            return false;
        };

        let mut stack = vec![start];
        while let Some(pos) = stack.pop() {
            match self.tiles.get_mut(&pos) {
                Some(tile) if !tile.marked => tile.marked = true,
                _ => continue,
            }
            stack.extend([
                pos.offset(-1, 0),
                pos.offset(1, 0),
                pos.offset(0, -1),
                pos.offset(0, 1),
            ]);
        }

        let mut continuous = true;
        for tile in self.tiles.values_mut() {
            if !tile.marked {
                tile.flag = TileFlag::Invalid;
                continuous = false;
            }
        }
        continuous
    }

    /// Positions flagged invalid by the last validation pass.
    pub fn flagged(&self) -> BTreeSet<Pos> {
        self.tiles
            .iter()
            .filter(|(_, t)| t.flag == TileFlag::Invalid)
            .map(|(&p, _)| p)
            .collect()
    }

    fn read_word(&self, start: Pos, orientation: Orientation) -> String {
        let (dx, dy) = orientation.step();
        let mut word = String::new();
        let mut pos = start;
        while let Some(tile) = self.tiles.get(&pos) {
            word.push(tile.letter);
            pos = pos.offset(dx, dy);
        }
        word
    }

    /// Every run of two or more letters, keyed by the word it spells.
    pub fn get_words(&self) -> WordMap {
        let mut words = WordMap::new();
        let runs = self
            .hwords
            .iter()
            .map(|&p| (p, Orientation::Horizontal))
            .chain(self.vwords.iter().map(|&p| (p, Orientation::Vertical)));
        for (start, orientation) in runs {
            words
                .entry(self.read_word(start, orientation))
                .or_default()
                .push(WordPos::new(start.x, start.y, orientation));
        }
        words
    }

    /// Flag every tile of the word starting at `at` as invalid.
    pub fn bad_word(&mut self, at: WordPos) {
        let (dx, dy) = at.orientation.step();
        let mut pos = Pos::new(at.x, at.y);
        while let Some(tile) = self.tiles.get_mut(&pos) {
            tile.flag = TileFlag::Invalid;
            pos = pos.offset(dx, dy);
        }
    }

    /// Highlight every tile of `letter`; `false` if there are none.
    pub fn highlight(&mut self, letter: char) -> bool {
        let mut found = false;
        for tile in self.tiles.values_mut() {
            if tile.letter == letter {
                tile.flag = TileFlag::Highlighted;
                found = true;
            }
        }
        found
    }

    /// Reset every tile to [`TileFlag::Normal`].
    pub fn clear_flags(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.flag = TileFlag::Normal;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn place(grid: &mut Grid, x: i32, y: i32, letter: char) {
        assert!(grid.swap(x, y, Tile::new(letter).unwrap()).is_none());
    }

    fn spell(grid: &mut Grid, x: i32, y: i32, orientation: Orientation, word: &str) {
        let (dx, dy) = orientation.step();
        for (i, letter) in word.chars().enumerate() {
            let i = i as i32;
            grid.swap(x + dx * i, y + dy * i, Tile::new(letter).unwrap());
        }
    }

    /// Word starts computed from scratch, for comparison with the indexes.
    fn scan_starts(grid: &Grid) -> (BTreeSet<Pos>, BTreeSet<Pos>) {
        let mut h = BTreeSet::new();
        let mut v = BTreeSet::new();
        for &p in grid.tiles.keys() {
            if !grid.occupied(p.offset(-1, 0)) && grid.occupied(p.offset(1, 0)) {
                h.insert(p);
            }
            if !grid.occupied(p.offset(0, -1)) && grid.occupied(p.offset(0, 1)) {
                v.insert(p);
            }
        }
        (h, v)
    }

    #[test]
    fn rejects_non_letter_tiles() {
        assert_eq!(Tile::new('a'), Err(GridError::InvalidLetter('a')));
        assert!(Tile::new('1').is_err());
        assert!(Tile::new('Q').is_ok());
    }

    #[test]
    fn swap_returns_previous_tile() {
        let mut grid = Grid::new();
        place(&mut grid, 0, 0, 'A');
        let old = grid.swap(0, 0, Tile::new('B').unwrap()).unwrap();
        assert_eq!(old.letter(), 'A');
        assert_eq!(grid.get(0, 0).unwrap().letter(), 'B');
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn remove_missing_is_none() {
        let mut grid = Grid::new();
        assert!(grid.remove(3, 3).is_none());
        place(&mut grid, 3, 3, 'Z');
        assert_eq!(grid.remove(3, 3).unwrap().letter(), 'Z');
        assert!(grid.is_empty());
        assert_eq!(grid.bounds(), None);
    }

    #[test]
    fn continuous_row() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "CAT");
        assert!(grid.is_continuous());
        assert!(grid.flagged().is_empty());
    }

    #[test]
    fn stray_tile_breaks_continuity() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "CAT");
        place(&mut grid, 5, 5, 'X');
        assert!(!grid.is_continuous());
        let flagged = grid.flagged();
        assert_eq!(flagged.len(), 1);
        assert!(flagged.contains(&Pos::new(5, 5)));

        grid.remove(5, 5);
        assert!(grid.is_continuous());
        assert!(grid.flagged().is_empty());
    }

    #[test]
    fn single_tile_is_not_continuous() {
        let mut grid = Grid::new();
        assert!(!grid.is_continuous());
        place(&mut grid, 0, 0, 'A');
        assert!(!grid.is_continuous());
    }

    #[test]
    fn words_share_first_letter() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "CAT");
        spell(&mut grid, 0, 0, Orientation::Vertical, "CAR");
        let words = grid.get_words();
        assert_eq!(words.len(), 2);
        assert_eq!(
            words["CAT"],
            vec![WordPos::new(0, 0, Orientation::Horizontal)]
        );
        assert_eq!(words["CAR"], vec![WordPos::new(0, 0, Orientation::Vertical)]);
    }

    #[test]
    fn duplicate_words_aggregate() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "AT");
        spell(&mut grid, 0, 0, Orientation::Vertical, "ABA");
        spell(&mut grid, 0, 2, Orientation::Horizontal, "AT");
        let words = grid.get_words();
        assert_eq!(words["AT"].len(), 2);
        assert!(words["AT"].contains(&WordPos::new(0, 2, Orientation::Horizontal)));
        assert!(grid.is_continuous());
    }

    #[test]
    fn filling_a_gap_merges_runs() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "AB");
        spell(&mut grid, 3, 0, Orientation::Horizontal, "CD");
        place(&mut grid, 2, 0, 'X');
        let words = grid.get_words();
        assert_eq!(words.keys().collect::<Vec<_>>(), vec!["ABXCD"]);

        grid.remove(2, 0);
        let words = grid.get_words();
        assert!(words.contains_key("AB"));
        assert!(words.contains_key("CD"));
    }

    #[test]
    fn bounds_shrink_after_edge_removal() {
        let mut grid = Grid::new();
        spell(&mut grid, -2, 0, Orientation::Horizontal, "WORD");
        place(&mut grid, 0, 4, 'S');
        assert_eq!(grid.bounds(), Some((Pos::new(-2, 0), Pos::new(1, 4))));
        grid.remove(0, 4);
        assert_eq!(grid.bounds(), Some((Pos::new(-2, 0), Pos::new(1, 0))));
        grid.remove(-2, 0);
        assert_eq!(grid.bounds(), Some((Pos::new(-1, 0), Pos::new(1, 0))));
    }

    #[test]
    fn highlight_and_bad_word_flags() {
        let mut grid = Grid::new();
        spell(&mut grid, 0, 0, Orientation::Horizontal, "XYZ");
        assert!(grid.highlight('Y'));
        assert!(!grid.highlight('Q'));
        assert_eq!(grid.get(1, 0).unwrap().flag, TileFlag::Highlighted);

        grid.bad_word(WordPos::new(0, 0, Orientation::Horizontal));
        assert_eq!(grid.flagged().len(), 3);
        grid.clear_flags();
        assert!(grid.flagged().is_empty());
    }

    proptest! {
        #[test]
        fn word_start_indexes_match_rescan(
            ops in proptest::collection::vec((any::<bool>(), 0i32..5, 0i32..5, 0u8..26), 1..120)
        ) {
            let mut grid = Grid::new();
            for (insert, x, y, letter) in ops {
                if insert {
                    grid.swap(x, y, Tile::new((b'A' + letter) as char).unwrap());
                } else {
                    grid.remove(x, y);
                }
                let (h, v) = scan_starts(&grid);
                prop_assert_eq!(&h, grid.hwords());
                prop_assert_eq!(&v, grid.vwords());
            }
        }
    }
}
