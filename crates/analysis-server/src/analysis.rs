//! Candidate-move generation for one position.
//!
//! MultiPV first; if that yields fewer lines than wanted, every legal move
//! is scored on its own and the best of those fill the gaps; if there is
//! still nothing, a bare `bestmove` is used.

use std::collections::HashSet;

use serde::Serialize;
use shakmaty::{CastlingMode, Position};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::game::GameSync;
use crate::stockfish::{PvLine, StockfishEngine};

/// Ranking value of a mate score, above any centipawn score.
const MATE_VALUE: i64 = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub multipv: usize,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    #[serde(rename = "move")]
    pub mv: String,
    pub score_cp: Option<i32>,
    pub mate: Option<i32>,
}

impl Candidate {
    pub fn from_line(line: &PvLine) -> Option<Self> {
        Some(Self::scored(line.first_move()?.to_string(), line))
    }

    /// `mv` with the score of `line`; a mate score hides the centipawns.
    pub fn scored(mv: String, line: &PvLine) -> Self {
        Self {
            mv,
            score_cp: if line.mate.is_some() { None } else { line.cp },
            mate: line.mate,
        }
    }

    /// Higher is better for the side to move. Mates outrank centipawns and
    /// a shorter mate outranks a longer one; being mated sooner ranks lowest.
    pub fn rank_value(&self) -> Option<i64> {
        match (self.mate, self.score_cp) {
            (Some(m), _) if m > 0 => Some(MATE_VALUE - i64::from(m)),
            (Some(m), _) => Some(-MATE_VALUE - i64::from(m)),
            (None, Some(cp)) => Some(i64::from(cp)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReply {
    pub pvs: Vec<Candidate>,
    pub fen: String,
}

/// Keep `primary` in order, then add the best of `scored` not already
/// present, up to `limit`. Unscored entries in `scored` are ignored.
pub fn merge_candidates(
    primary: Vec<Candidate>,
    mut scored: Vec<Candidate>,
    limit: usize,
) -> Vec<Candidate> {
    scored.retain(|c| c.rank_value().is_some());
    scored.sort_by_key(|c| std::cmp::Reverse(c.rank_value()));

    let mut seen: HashSet<String> = primary.iter().map(|c| c.mv.clone()).collect();
    let mut merged = primary;
    for candidate in scored {
        if merged.len() >= limit {
            break;
        }
        if seen.insert(candidate.mv.clone()) {
            merged.push(candidate);
        }
    }
    merged.truncate(limit);
    merged
}

/// Candidate moves for the game's current position, best first.
pub async fn analyse(
    engine: &mut StockfishEngine,
    game: &GameSync,
    settings: AnalysisSettings,
) -> Result<AnalysisReply, EngineError> {
    let fen = game.fen();

    let mut pvs: Vec<Candidate> = match engine.analyse_multipv(&fen, settings.depth, settings.multipv).await {
        Ok(lines) => lines.iter().filter_map(Candidate::from_line).collect(),
        Err(EngineError::Exited) => return Err(EngineError::Exited),
        Err(e) => {
            warn!(error = %e, "MultiPV search failed");
            Vec::new()
        }
    };

    if pvs.len() < settings.multipv {
        let legal = game.position().legal_moves();
        debug!(lines = pvs.len(), legal = legal.len(), "Scoring legal moves one by one");
        let mut scored = Vec::with_capacity(legal.len());
        for mv in &legal {
            let uci = mv.to_uci(CastlingMode::Standard).to_string();
            match engine.analyse_move(&fen, settings.depth, &uci).await {
                Ok(Some(line)) => scored.push(Candidate::scored(uci, &line)),
                Ok(None) => {}
                Err(EngineError::Exited) => return Err(EngineError::Exited),
                Err(e) => debug!(mv = %uci, error = %e, "Per-move search failed"),
            }
        }
        pvs = merge_candidates(pvs, scored, settings.multipv);
    }

    if pvs.is_empty() {
        if let Some(mv) = engine.best_move(&fen, settings.depth).await? {
            pvs.push(Candidate {
                mv,
                score_cp: None,
                mate: None,
            });
        }
    }

    Ok(AnalysisReply { pvs, fen })
}
