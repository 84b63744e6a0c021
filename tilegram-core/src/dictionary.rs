//! Word lookup. The server answers check-word requests from a [`WordCheck`];
//! clients cache answers locally.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Word validity predicate.
pub trait WordCheck {
    fn check_word(&self, word: &str) -> bool;
}

impl<F> WordCheck for F
where
    F: Fn(&str) -> bool,
{
    fn check_word(&self, word: &str) -> bool {
        self(word)
    }
}

/// Word list with optional definitions, one entry per line:
/// the word, then optionally a space and its definition.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashMap<String, String>,
}

impl Dictionary {
    /// Parse a word list. Words are stored uppercase; blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        let words = text
            .lines()
            .filter_map(|line| {
                let line = line.trim_end_matches('\r');
                let (word, definition) = line.split_once(' ').unwrap_or((line, ""));
                let word = word.trim();
                if word.is_empty() {
                    None
                } else {
                    Some((word.to_ascii_uppercase(), definition.trim().to_string()))
                }
            })
            .collect();
        Self { words }
    }

    /// Load a word list from a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn definition(&self, word: &str) -> Option<&str> {
        self.words.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordCheck for Dictionary {
    fn check_word(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }
}
