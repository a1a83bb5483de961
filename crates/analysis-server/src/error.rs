//! Analysis server error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Stockfish process exited")]
    Exited,
}

/// A move sequence that cannot be replayed from the start position.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GameError {
    #[error("Cannot parse SAN '{0}'")]
    InvalidSan(String),

    #[error("Illegal move '{0}'")]
    IllegalMove(String),
}
