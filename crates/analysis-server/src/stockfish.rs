//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::collections::BTreeMap;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::debug;

use crate::error::EngineError;

/// A single PV line from a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PvLine {
    /// Principal variation moves in UCI notation
    pub pv: Vec<String>,
    /// Centipawn score (side to move)
    pub cp: Option<i32>,
    /// Mate in N (positive = side to move mates)
    pub mate: Option<i32>,
}

impl PvLine {
    pub fn first_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }
}

/// Everything one `go` produced: the deepest line per MultiPV slot and the
/// final `bestmove`.
#[derive(Debug, Default)]
struct SearchOutcome {
    lines: BTreeMap<u32, PvLine>,
    best_move: Option<String>,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str) -> Result<Self, EngineError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| EngineError::Stockfish("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 64").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Next output line, trimmed. EOF means the process is gone.
    async fn read_line(&mut self, line: &mut String) -> Result<(), EngineError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| EngineError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(EngineError::Exited);
        }
        let trimmed_len = line.trim_end().len();
        line.truncate(trimmed_len);
        Ok(())
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), EngineError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            debug!(line = line.as_str(), "SF >");
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    async fn search(&mut self, fen: &str, go: &str) -> Result<SearchOutcome, EngineError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(go).await?;

        let mut outcome = SearchOutcome::default();
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                let idx = parse_multipv_index(trimmed).unwrap_or(1);
                outcome.lines.insert(
                    idx,
                    PvLine {
                        pv: parse_pv(trimmed),
                        cp: parse_cp(trimmed),
                        mate: parse_mate(trimmed),
                    },
                );
            } else if trimmed.starts_with("bestmove") {
                outcome.best_move = parse_bestmove(trimmed);
                break;
            }
        }
        Ok(outcome)
    }

    /// Best `multipv` lines to `depth`, best first. Lines without a move are dropped.
    pub async fn analyse_multipv(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: usize,
    ) -> Result<Vec<PvLine>, EngineError> {
        self.send(&format!("setoption name MultiPV value {multipv}")).await?;
        let outcome = self.search(fen, &format!("go depth {depth}")).await;
        // Reset MultiPV to 1 even when the search failed
        self.send("setoption name MultiPV value 1").await?;

        Ok(outcome?
            .lines
            .into_values()
            .filter(|line| !line.pv.is_empty())
            .take(multipv)
            .collect())
    }

    /// Score of one root move, searched on its own.
    pub async fn analyse_move(
        &mut self,
        fen: &str,
        depth: u32,
        uci: &str,
    ) -> Result<Option<PvLine>, EngineError> {
        let outcome = self
            .search(fen, &format!("go depth {depth} searchmoves {uci}"))
            .await?;
        Ok(outcome.lines.into_values().next())
    }

    /// Plain `bestmove`, without a score. `None` when there is no legal move.
    pub async fn best_move(&mut self, fen: &str, depth: u32) -> Result<Option<String>, EngineError> {
        Ok(self.search(fen, &format!("go depth {depth}")).await?.best_move)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Value following `key` in a whitespace-separated info line
fn parse_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    parts.find(|part| *part == key)?;
    parts.next()?.parse().ok()
}

fn parse_cp(line: &str) -> Option<i32> {
    parse_after(line, "cp")
}

fn parse_mate(line: &str) -> Option<i32> {
    parse_after(line, "mate")
}

/// Parse multipv index (1-based) from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_after(line, "multipv")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|part| *part != "pv")
        .skip(1)
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(str::to_string)
        .collect()
}

fn parse_bestmove(line: &str) -> Option<String> {
    line.split_whitespace()
        .nth(1)
        .filter(|mv| *mv != "(none)")
        .map(str::to_string)
}
