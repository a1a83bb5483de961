//! Move-quality overlay for a live chess board view.
//!
//! Reads the host's move list, keeps a remote analysis source in sync with
//! it and paints the returned candidate moves onto two SVG layers attached
//! to the board view.

pub mod candidates;
pub mod coach;
pub mod config;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod locator;
pub mod notation;
pub mod orientation;
pub mod render;
pub mod selector;
pub mod square;
pub mod sync;
pub mod watcher;

pub use coach::OverlayCoach;
pub use config::CoachConfig;
pub use dom::{Document, DocumentSnapshot, ElementSpec, NodeId, SharedDocument};
pub use error::OverlayError;
pub use watcher::MutationBatch;
