//! Candidate selection: normalise, drop malformed, dedupe by destination,
//! truncate to the display budget.
//!
//! The remote source's list order is the rank; no scores are compared here.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::square::Square;

/// Most annotations painted at once.
pub const MAX_DISPLAY: usize = 5;

/// One inbound candidate entry, in any of the shapes the remote source sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCandidate {
    Structured {
        #[serde(rename = "move")]
        mv: String,
        #[serde(default)]
        score_cp: Option<Value>,
        #[serde(default)]
        mate: Option<Value>,
    },
    Coordinate {
        uci: String,
        #[serde(default)]
        score_cp: Option<Value>,
        #[serde(default)]
        mate: Option<Value>,
    },
    Bare(String),
    Unrecognized(Value),
}

impl RawCandidate {
    /// Canonical form, or `None` for malformed entries.
    pub fn normalize(&self) -> Option<CandidateMove> {
        let (mv, score_cp, mate) = match self {
            RawCandidate::Structured { mv, score_cp, mate }
            | RawCandidate::Coordinate { uci: mv, score_cp, mate } => {
                (mv.as_str(), score(score_cp.as_ref()), score(mate.as_ref()))
            }
            RawCandidate::Bare(mv) => (mv.as_str(), None, None),
            RawCandidate::Unrecognized(_) => return None,
        };
        let (from, to) = parse_coordinate_move(mv)?;
        Some(CandidateMove {
            from,
            to,
            score_cp,
            mate,
        })
    }
}

/// Integer score from any JSON number; anything else is unset.
fn score(value: Option<&Value>) -> Option<i64> {
    let Some(Value::Number(n)) = value else {
        return None;
    };
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
            .map(|f| f.round() as i64)
    })
}

/// `e2e4`, `e7e8q`: the first four characters must be two valid squares.
fn parse_coordinate_move(mv: &str) -> Option<(Square, Square)> {
    let from = mv.get(0..2)?.parse().ok()?;
    let to = mv.get(2..4)?.parse().ok()?;
    Some((from, to))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMove {
    pub from: Square,
    pub to: Square,
    pub score_cp: Option<i64>,
    pub mate: Option<i64>,
}

impl CandidateMove {
    /// Evaluation label: `#N` for a mate, pawns with two decimals otherwise.
    pub fn label(&self) -> Option<String> {
        if let Some(mate) = self.mate {
            Some(format!("#{mate}"))
        } else {
            self.score_cp
                .map(|cp| format!("{:.2}", cp as f64 / 100.0))
        }
    }
}

/// Best-first candidates, at most [`MAX_DISPLAY`], distinct destinations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedCandidateSet {
    moves: Vec<CandidateMove>,
}

impl RankedCandidateSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn moves(&self) -> &[CandidateMove] {
        &self.moves
    }

    /// Candidates with their rank and rank colour.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, RankColor, &CandidateMove)> {
        let n = self.moves.len();
        self.moves
            .iter()
            .enumerate()
            .map(move |(rank, mv)| (rank, rank_color(rank, n), mv))
    }
}

pub fn select(raw: &[RawCandidate]) -> RankedCandidateSet {
    select_top(raw, MAX_DISPLAY)
}

/// [`select`] with an explicit display budget.
pub fn select_top(raw: &[RawCandidate], limit: usize) -> RankedCandidateSet {
    let mut seen = HashSet::new();
    let moves = raw
        .iter()
        .filter_map(RawCandidate::normalize)
        .filter(|c| seen.insert(c.to))
        .take(limit)
        .collect();
    RankedCandidateSet { moves }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for RankColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Green for the best of `n`, red for the worst, linear in between.
pub fn rank_color(rank: usize, n: usize) -> RankColor {
    if n <= 1 {
        return RankColor { r: 0, g: 255, b: 0 };
    }
    let t = rank.min(n - 1) as f64 / (n - 1) as f64;
    RankColor {
        r: (255.0 * t).round() as u8,
        g: (255.0 * (1.0 - t)).round() as u8,
        b: 0,
    }
}
