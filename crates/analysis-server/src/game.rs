//! Per-connection game state: replays the client's SAN move list.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{Chess, EnPassantMode, Position};

use crate::error::GameError;

#[derive(Debug, Default)]
pub struct GameSync {
    pos: Chess,
    played: Vec<String>,
}

impl GameSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    pub fn ply(&self) -> usize {
        self.played.len()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    pub fn reset(&mut self) {
        self.pos = Chess::default();
        self.played.clear();
    }

    /// Bring the position in line with `moves`.
    ///
    /// A sequence extending the one already replayed only plays the new
    /// moves; anything else replays from the start. On a bad move the game
    /// is reset to the start position.
    pub fn sync(&mut self, moves: &[String]) -> Result<(), GameError> {
        if !moves.starts_with(&self.played) {
            self.reset();
        }
        for san in &moves[self.played.len()..] {
            if let Err(e) = self.play(san) {
                self.reset();
                return Err(e);
            }
        }
        Ok(())
    }

    fn play(&mut self, san: &str) -> Result<(), GameError> {
        let parsed: SanPlus = san
            .trim()
            .parse()
            .map_err(|_| GameError::InvalidSan(san.to_string()))?;
        let mv = parsed
            .san
            .to_move(&self.pos)
            .map_err(|_| GameError::IllegalMove(san.to_string()))?;
        self.pos.play_unchecked(mv);
        self.played.push(san.to_string());
        Ok(())
    }
}
