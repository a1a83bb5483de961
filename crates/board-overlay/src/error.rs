//! Overlay error types

use thiserror::Error;

use crate::dom::NodeId;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("Node {0:?} is no longer attached")]
    StaleNode(NodeId),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
