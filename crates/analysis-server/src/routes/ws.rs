//! WebSocket analysis route
//!
//! Each connection keeps its own game; the client sends its full SAN move
//! list whenever it changes and gets back the best candidate moves for the
//! resulting position.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::analysis::{self, AnalysisReply, AnalysisSettings};
use crate::game::GameSync;
use crate::stockfish::StockfishEngine;

/// Shared by every connection; the engine handles one search at a time.
#[derive(Clone)]
pub struct EngineState {
    pub engine: Arc<Mutex<StockfishEngine>>,
    pub settings: AnalysisSettings,
}

// ---- Message types ----

/// Server → Client messages
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Analysis(AnalysisReply),
    Status { status: &'static str },
    Error { error: String },
}

impl ServerMessage {
    fn reset() -> Self {
        ServerMessage::Status { status: "reset" }
    }

    fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: message.into(),
        }
    }
}

/// Client payload: a JSON array of SAN strings.
pub fn parse_moves(text: &str) -> Result<Vec<String>, ServerMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| ServerMessage::error("Invalid JSON"))?;
    if !value.is_array() {
        return Err(ServerMessage::error("Expected list of moves"));
    }
    serde_json::from_value(value).map_err(|_| ServerMessage::error("Expected list of moves"))
}

// ---- WebSocket handler ----

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<EngineState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: EngineState) {
    let (mut sender, mut receiver) = socket.split();
    let mut game = GameSync::new();
    info!("Client connected");

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = respond(&state, &mut game, &text).await;
        if let Err(e) = send_msg(&mut sender, &reply).await {
            warn!(error = %e, "Failed to send reply");
            break;
        }
    }
    info!("Client disconnected");
}

async fn respond(state: &EngineState, game: &mut GameSync, text: &str) -> ServerMessage {
    let moves = match parse_moves(text) {
        Ok(moves) => moves,
        Err(reply) => return reply,
    };

    if let Err(e) = game.sync(&moves) {
        warn!(error = %e, "Cannot replay move list, resetting");
        return ServerMessage::reset();
    }
    debug!(ply = game.ply(), fen = %game.fen(), "Position synced");

    let mut engine = state.engine.lock().await;
    match analysis::analyse(&mut engine, game, state.settings).await {
        Ok(reply) => {
            debug!(candidates = reply.pvs.len(), fen = %reply.fen, "Sending analysis");
            ServerMessage::Analysis(reply)
        }
        Err(e) => {
            error!(error = %e, "Analysis failed");
            ServerMessage::error(format!("Analysis failed: {e}"))
        }
    }
}

// ---- Helper: send message ----

async fn send_msg(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
