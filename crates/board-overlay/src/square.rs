use std::fmt;
use std::str::FromStr;

use crate::error::OverlayError;

/// Algebraic board coordinate. `file` is 0..=7 (a..h), `rank` is 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && (1..=8).contains(&rank) {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    /// Zero-based file index (a = 0).
    pub fn file(self) -> u8 {
        self.file
    }

    /// One-based rank (1..=8).
    pub fn rank(self) -> u8 {
        self.rank
    }

    pub fn file_char(self) -> char {
        (b'a' + self.file) as char
    }

    pub fn all() -> impl Iterator<Item = Square> {
        (0..8u8).flat_map(|file| (1..=8u8).map(move |rank| Square { file, rank }))
    }
}

impl FromStr for Square {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(OverlayError::InvalidSquare(s.to_string()));
        }
        let file = match bytes[0] {
            b @ b'a'..=b'h' => b - b'a',
            _ => return Err(OverlayError::InvalidSquare(s.to_string())),
        };
        let rank = match bytes[1] {
            b @ b'1'..=b'8' => b - b'0',
            _ => return Err(OverlayError::InvalidSquare(s.to_string())),
        };
        Ok(Self { file, rank })
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank)
    }
}
