//! Overlay layers and candidate painting.
//!
//! Two input-transparent SVG layers share the board's box: the beneath
//! layer sits before the first piece so pieces stay visible over the square
//! borders, the above layer is appended last so labels stay visible over
//! the pieces. Every paint clears both layers first.

use tracing::debug;

use crate::candidates::{CandidateMove, RankColor, RankedCandidateSet};
use crate::dom::{Document, NodeId};
use crate::error::OverlayError;
use crate::geometry::{square_rect, SquareRect};

/// Marker class of the layer drawn beneath the pieces.
pub const BENEATH_CLASS: &str = "coach-overlay-bg";
/// Marker class of the layer drawn above the pieces.
pub const ABOVE_CLASS: &str = "coach-overlay-fg";

const PIECE_CLASS: &str = "piece";
const DEST_STROKE_WIDTH: f64 = 0.4;
const MIN_SOURCE_STROKE_WIDTH: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayLayers {
    pub beneath: NodeId,
    pub above: NodeId,
}

/// Existing layers of `view`, without creating anything.
pub fn find_layers(doc: &Document, view: NodeId) -> Option<OverlayLayers> {
    Some(OverlayLayers {
        beneath: find_layer(doc, view, BENEATH_CLASS)?,
        above: find_layer(doc, view, ABOVE_CLASS)?,
    })
}

fn find_layer(doc: &Document, view: NodeId, class: &str) -> Option<NodeId> {
    doc.descendants(view)
        .into_iter()
        .find(|&id| doc.has_class(id, class) && doc.element(id).is_some_and(|e| e.tag == "svg"))
}

/// Attach both layers to `view` unless already present. Idempotent.
pub fn ensure_layers(doc: &mut Document, view: NodeId) -> Result<OverlayLayers, OverlayError> {
    if doc.element(view).is_none() {
        return Err(OverlayError::StaleNode(view));
    }

    let beneath = match find_layer(doc, view, BENEATH_CLASS) {
        Some(layer) => layer,
        None => {
            let first_piece = doc
                .children(view)
                .iter()
                .copied()
                .find(|&c| doc.has_class(c, PIECE_CLASS));
            let reference = first_piece.or_else(|| doc.children(view).first().copied());
            let layer = create_layer(doc, BENEATH_CLASS);
            doc.insert_before(view, layer, reference)?;
            debug!(?view, "Attached beneath layer");
            layer
        }
    };

    let above = match find_layer(doc, view, ABOVE_CLASS) {
        Some(layer) => layer,
        None => {
            let layer = create_layer(doc, ABOVE_CLASS);
            doc.append_child(view, layer)?;
            debug!(?view, "Attached above layer");
            layer
        }
    };

    Ok(OverlayLayers { beneath, above })
}

fn create_layer(doc: &mut Document, class: &str) -> NodeId {
    let svg = doc.create_element("svg");
    doc.add_class(svg, class);
    doc.set_attr(svg, "viewBox", "0 0 100 100");
    doc.set_attr(svg, "preserveAspectRatio", "none");
    doc.set_attr(svg, "style", "pointer-events: none;");
    svg
}

pub fn clear_layers(doc: &mut Document, layers: OverlayLayers) {
    doc.remove_children(layers.beneath);
    doc.remove_children(layers.above);
}

/// Repaint `set` onto the layers of `view`. An empty set leaves both
/// layers empty.
pub fn render(
    doc: &mut Document,
    view: NodeId,
    set: &RankedCandidateSet,
    mirrored: bool,
) -> Result<OverlayLayers, OverlayError> {
    let layers = ensure_layers(doc, view)?;
    clear_layers(doc, layers);

    for (rank, color, candidate) in set.ranked() {
        paint_candidate(doc, layers, rank, color, candidate, mirrored)?;
    }
    Ok(layers)
}

fn paint_candidate(
    doc: &mut Document,
    layers: OverlayLayers,
    rank: usize,
    color: RankColor,
    candidate: &CandidateMove,
    mirrored: bool,
) -> Result<(), OverlayError> {
    let from = square_rect(candidate.from, mirrored);
    let to = square_rect(candidate.to, mirrored);
    let color = color.to_string();

    // Source: dashed and thinner than the destination border
    let source_width = (0.35 - 0.03 * rank as f64).max(MIN_SOURCE_STROKE_WIDTH);
    let source = square_border(doc, from, &color, source_width, "0.9");
    doc.set_attr(source, "stroke-dasharray", "2,2");
    doc.append_child(layers.beneath, source)?;

    let dest = square_border(doc, to, &color, DEST_STROKE_WIDTH, "0.95");
    doc.append_child(layers.beneath, dest)?;

    if let Some(label) = candidate.label() {
        let text = doc.create_element("text");
        doc.set_attr(text, "x", fmt_unit(to.center_x));
        doc.set_attr(text, "y", fmt_unit(to.center_y));
        doc.set_attr(text, "fill", "#ffffff");
        doc.set_attr(text, "font-size", "3.6");
        doc.set_attr(text, "font-family", "Segoe UI, Arial");
        doc.set_attr(text, "font-weight", "700");
        doc.set_attr(text, "text-anchor", "middle");
        doc.set_attr(text, "dominant-baseline", "central");
        doc.set_attr(text, "style", "stroke:black; stroke-width:0.4; paint-order:stroke;");
        let content = doc.create_text(&label);
        doc.append_child(text, content)?;
        doc.append_child(layers.above, text)?;
    }
    Ok(())
}

fn square_border(doc: &mut Document, rect: SquareRect, color: &str, width: f64, opacity: &str) -> NodeId {
    let border = doc.create_element("rect");
    doc.set_attr(border, "x", fmt_unit(rect.x));
    doc.set_attr(border, "y", fmt_unit(rect.y));
    doc.set_attr(border, "width", fmt_unit(rect.width));
    doc.set_attr(border, "height", fmt_unit(rect.height));
    doc.set_attr(border, "fill", "none");
    doc.set_attr(border, "stroke", color);
    doc.set_attr(border, "stroke-width", format!("{width:.2}"));
    doc.set_attr(border, "rx", "0.4");
    doc.set_attr(border, "ry", "0.4");
    doc.set_attr(border, "opacity", opacity);
    border
}

/// Overlay units without a trailing `.0` on whole numbers.
fn fmt_unit(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::{select, select_top, RawCandidate};
    use crate::dom::{DocumentSnapshot, ElementSpec};
    use crate::selector::Selector;
    use serde_json::json;

    fn board() -> (Document, NodeId) {
        let view = ElementSpec::new("wc-chess-board")
            .id("board-play")
            .child(ElementSpec::new("svg").class("coordinates"))
            .child(ElementSpec::new("div").class("piece wp square-52"))
            .child(ElementSpec::new("div").class("piece bk square-58"));
        let doc = Document::from_snapshot(DocumentSnapshot {
            globals: Default::default(),
            body: ElementSpec::new("body").child(view),
        });
        let view = doc.children(doc.root())[0];
        (doc, view)
    }

    fn candidates(value: serde_json::Value) -> RankedCandidateSet {
        let raw: Vec<RawCandidate> = serde_json::from_value(value).unwrap();
        select(&raw)
    }

    #[test]
    fn test_layers_bracket_the_pieces() {
        let (mut doc, view) = board();
        let layers = ensure_layers(&mut doc, view).unwrap();
        let children = doc.children(view);
        assert_eq!(children[1], layers.beneath);
        assert!(doc.has_class(children[2], "piece"));
        assert_eq!(*children.last().unwrap(), layers.above);
        assert_eq!(doc.attr(layers.above, "viewBox"), Some("0 0 100 100"));
    }

    #[test]
    fn test_beneath_layer_goes_first_without_pieces() {
        let mut doc = Document::new();
        let root = doc.root();
        let view = doc.create_element("wc-chess-board");
        doc.append_child(root, view).unwrap();
        let existing = doc.create_element("div");
        doc.append_child(view, existing).unwrap();
        let layers = ensure_layers(&mut doc, view).unwrap();
        assert_eq!(doc.children(view), &[layers.beneath, existing, layers.above]);
    }

    #[test]
    fn test_ensure_layers_is_idempotent() {
        let (mut doc, view) = board();
        let first = ensure_layers(&mut doc, view).unwrap();
        let second = ensure_layers(&mut doc, view).unwrap();
        assert_eq!(first, second);
        assert_eq!(doc.query_all(view, &Selector::fixed("svg")).len(), 3);
    }

    #[test]
    fn test_render_paints_borders_and_labels() {
        let (mut doc, view) = board();
        let set = candidates(json!([
            {"move": "e2e4", "score_cp": 35},
            {"move": "g8f6", "mate": 2},
            {"move": "b1c3"}
        ]));
        let layers = render(&mut doc, view, &set, false).unwrap();

        let rects = doc.children(layers.beneath);
        assert_eq!(rects.len(), 6);
        // e2 source, dashed, best colour
        assert_eq!(doc.attr(rects[0], "x"), Some("50"));
        assert_eq!(doc.attr(rects[0], "y"), Some("75"));
        assert_eq!(doc.attr(rects[0], "stroke-dasharray"), Some("2,2"));
        assert_eq!(doc.attr(rects[0], "stroke"), Some("rgb(0,255,0)"));
        // e4 destination, solid
        assert_eq!(doc.attr(rects[1], "y"), Some("50"));
        assert_eq!(doc.attr(rects[1], "stroke-dasharray"), None);
        assert_eq!(doc.attr(rects[1], "stroke-width"), Some("0.40"));
        assert_eq!(doc.attr(rects[5], "stroke"), Some("rgb(255,0,0)"));

        let labels: Vec<String> = doc
            .children(layers.above)
            .iter()
            .map(|&t| doc.text_content(t))
            .collect();
        assert_eq!(labels, vec!["0.35", "#2"]);
        let first_label = doc.children(layers.above)[0];
        assert_eq!(doc.attr(first_label, "x"), Some("56.25"));
        assert_eq!(doc.attr(first_label, "y"), Some("56.25"));
    }

    #[test]
    fn test_source_border_always_thinner() {
        let (mut doc, view) = board();
        let set = candidates(json!(["a2a3", "b2b3", "c2c3", "d2d3", "e2e3"]));
        let layers = render(&mut doc, view, &set, false).unwrap();
        for pair in doc.children(layers.beneath).chunks(2) {
            let source: f64 = doc.attr(pair[0], "stroke-width").unwrap().parse().unwrap();
            let dest: f64 = doc.attr(pair[1], "stroke-width").unwrap().parse().unwrap();
            assert!(source < dest);
        }
    }

    #[test]
    fn test_source_border_stays_visible_past_default_budget() {
        let (mut doc, view) = board();
        let moves: Vec<String> = ["3", "4"]
            .iter()
            .flat_map(|rank| ('a'..='h').map(move |f| format!("{f}2{f}{rank}")))
            .collect();
        let raw: Vec<RawCandidate> = serde_json::from_value(json!(moves)).unwrap();
        let set = select_top(&raw, moves.len());
        assert_eq!(set.len(), 16);

        let layers = render(&mut doc, view, &set, false).unwrap();
        for pair in doc.children(layers.beneath).chunks(2) {
            let source: f64 = doc.attr(pair[0], "stroke-width").unwrap().parse().unwrap();
            assert!(source > 0.0);
            assert!(source < DEST_STROKE_WIDTH);
        }
    }

    #[test]
    fn test_mirrored_render() {
        let (mut doc, view) = board();
        let set = candidates(json!([{"move": "a1b1", "score_cp": 0}]));
        let layers = render(&mut doc, view, &set, true).unwrap();
        let source = doc.children(layers.beneath)[0];
        assert_eq!(doc.attr(source, "x"), Some("87.5"));
        assert_eq!(doc.attr(source, "y"), Some("0"));
    }

    #[test]
    fn test_rerender_replaces_and_empty_clears() {
        let (mut doc, view) = board();
        render(&mut doc, view, &candidates(json!(["e2e4", "d2d4"])), false).unwrap();
        let layers = render(&mut doc, view, &candidates(json!(["c2c4"])), false).unwrap();
        assert_eq!(doc.children(layers.beneath).len(), 2);

        let layers = render(&mut doc, view, &RankedCandidateSet::empty(), false).unwrap();
        assert!(doc.children(layers.beneath).is_empty());
        assert!(doc.children(layers.above).is_empty());
    }
}
