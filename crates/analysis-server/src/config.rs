use std::env;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path to Stockfish binary
    pub stockfish_path: String,
    /// Candidate lines returned per position
    pub multipv: usize,
    pub search_depth: u32,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8765),
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or_else(|_| "stockfish".to_string()),
            multipv: env::var("MULTIPV")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(3),
            search_depth: env::var("SEARCH_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
        }
    }
}
