pub mod analysis;
pub mod config;
pub mod error;
pub mod game;
pub mod routes;
pub mod stockfish;
