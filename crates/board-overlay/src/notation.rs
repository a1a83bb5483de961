//! Move-list reconstruction: host move-list rows to portable notation.
//!
//! Every pass rebuilds the full sequence from the current tree. A cell that
//! cannot be read is skipped; the rest of the sequence is still returned.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::selector::Selector;
use crate::square::Square;

static MOVE_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::fixed(".main-line-row.move-list-row"));
static WHITE_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::fixed(".white-move"));
static BLACK_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::fixed(".black-move"));
static CELL_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::fixed(".node-highlight-content"));
static FIGURINE: LazyLock<Selector> = LazyLock::new(|| Selector::fixed(".icon-font-chess"));

/// Last file/rank pair of a move text, i.e. the destination.
static DESTINATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-h][1-8])(?:=?[QRBN])?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Map a figurine marker value. Unknown markers read as pawn moves.
    pub fn from_figurine(marker: &str) -> Self {
        match marker {
            "N" => PieceKind::Knight,
            "B" => PieceKind::Bishop,
            "R" => PieceKind::Rook,
            "Q" => PieceKind::Queen,
            "K" => PieceKind::King,
            _ => PieceKind::Pawn,
        }
    }

    /// Notation prefix; pawns have none.
    pub fn letter(self) -> Option<char> {
        match self {
            PieceKind::Pawn => None,
            PieceKind::Knight => Some('N'),
            PieceKind::Bishop => Some('B'),
            PieceKind::Rook => Some('R'),
            PieceKind::Queen => Some('Q'),
            PieceKind::King => Some('K'),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastleSide {
    Kingside,
    Queenside,
}

/// One ply as read from the move list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub piece: PieceKind,
    /// Disambiguated target text without the piece prefix, e.g. `f3`,
    /// `bd2`, `exd5`, `e8=Q`. Empty for castling.
    pub target: String,
    pub castle: Option<CastleSide>,
}

impl MoveRecord {
    pub fn castle(side: CastleSide) -> Self {
        Self {
            piece: PieceKind::King,
            target: String::new(),
            castle: Some(side),
        }
    }

    pub fn is_castle_kingside(&self) -> bool {
        self.castle == Some(CastleSide::Kingside)
    }

    pub fn is_castle_queenside(&self) -> bool {
        self.castle == Some(CastleSide::Queenside)
    }

    /// Destination square, when the target text ends in one.
    pub fn destination(&self) -> Option<Square> {
        DESTINATION
            .captures(&self.target)
            .and_then(|c| c[1].parse().ok())
    }
}

impl fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.castle {
            Some(CastleSide::Kingside) => f.write_str("O-O"),
            Some(CastleSide::Queenside) => f.write_str("O-O-O"),
            None => {
                if let Some(letter) = self.piece.letter() {
                    write!(f, "{letter}")?;
                }
                f.write_str(&self.target)
            }
        }
    }
}

/// Read every move cell under `scope`, white before black within a row.
pub fn extract_moves(doc: &Document, scope: NodeId) -> Vec<MoveRecord> {
    let mut moves = Vec::new();
    for row in doc.query_all(scope, &MOVE_ROWS) {
        for cell_selector in [&*WHITE_CELL, &*BLACK_CELL] {
            let Some(cell) = doc.query(row, cell_selector) else {
                continue;
            };
            match parse_cell(doc, cell) {
                Some(record) => moves.push(record),
                None => debug!(?cell, "Skipping unreadable move cell"),
            }
        }
    }
    moves
}

/// Portable notation strings for the whole move list.
pub fn extract_notation(doc: &Document, scope: NodeId) -> Vec<String> {
    extract_moves(doc, scope)
        .iter()
        .map(MoveRecord::to_string)
        .collect()
}

fn parse_cell(doc: &Document, cell: NodeId) -> Option<MoveRecord> {
    let content = doc.query(cell, &CELL_CONTENT)?;
    let text = clean_move_text(&doc.text_content_excluding(content, "span"));
    if text.is_empty() {
        return None;
    }
    match text.as_str() {
        "O-O" => return Some(MoveRecord::castle(CastleSide::Kingside)),
        "O-O-O" => return Some(MoveRecord::castle(CastleSide::Queenside)),
        _ => {}
    }
    let piece = doc
        .query(content, &FIGURINE)
        .and_then(|icon| doc.attr(icon, "data-figurine"))
        .map(PieceKind::from_figurine)
        .unwrap_or(PieceKind::Pawn);
    let record = MoveRecord {
        piece,
        target: text,
        castle: None,
    };
    // Result markers and annotations carry no square
    record.destination()?;
    Some(record)
}

/// Trim whitespace and trailing check/mate decoration.
fn clean_move_text(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['+', '#'])
        .trim()
        .to_string()
}
