//! Finds the live board view in the host tree.

use std::sync::LazyLock;

use crate::dom::{Document, NodeId};
use crate::selector::Selector;

static LAYOUT_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::fixed(".board-layout-main"));

static CONTAINER_BOARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::fixed("wc-chess-board, .board"));

/// Known mount points for the live-game board variants, most specific first.
static KNOWN_BOARDS: LazyLock<[Selector; 4]> = LazyLock::new(|| {
    [
        Selector::fixed("wc-chess-board#board-play"),
        Selector::fixed("wc-chess-board#board-play-computer"),
        Selector::fixed("wc-chess-board.board"),
        Selector::fixed("wc-chess-board"),
    ]
});

/// Resolve the currently active board view, if any. Pure read.
pub fn locate(doc: &Document) -> Option<NodeId> {
    let root = doc.root();
    if let Some(board) = doc
        .query(root, &LAYOUT_CONTAINER)
        .and_then(|container| doc.query(container, &CONTAINER_BOARD))
    {
        return Some(board);
    }
    KNOWN_BOARDS
        .iter()
        .find_map(|selector| doc.query(root, selector))
}
