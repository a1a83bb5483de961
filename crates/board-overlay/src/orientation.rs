//! Board orientation resolution.
//!
//! An ordered list of independent probes, each answering "mirrored?" with
//! `Some(verdict)` or abstaining with `None`. The first verdict wins. A
//! probe that fails is logged and skipped. Nothing is cached: the host can
//! flip the board without replacing the view element.

use std::sync::LazyLock;

use serde_json::Value;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::error::OverlayError;
use crate::selector::Selector;

/// Global names under which the host has been seen to expose its board controller.
pub const CONTROLLER_GLOBALS: &[&str] = &[
    "ChessBoardController",
    "chessboardController",
    "__CHESS_BOARD__",
    "boardController",
    "board",
];

static COORDINATE_LABELS: LazyLock<Selector> =
    LazyLock::new(|| Selector::fixed("svg.coordinates text"));

/// Labels needed before the geometric probe trusts the coordinate layer.
const MIN_COORDINATE_LABELS: usize = 8;

/// Everything a probe may look at.
pub struct ProbeContext<'a> {
    pub doc: &'a Document,
    pub view: NodeId,
}

pub type OrientationProbe = fn(&ProbeContext<'_>) -> Result<Option<bool>, OverlayError>;

/// Probes in priority order.
pub const PROBES: &[(&str, OrientationProbe)] = &[
    ("explicit_flag", explicit_flag as OrientationProbe),
    ("global_controller", global_controller as OrientationProbe),
    ("coordinate_labels", coordinate_labels as OrientationProbe),
];

/// Whether the view shows rank 1 at the top.
pub fn is_mirrored(doc: &Document, view: NodeId) -> bool {
    resolve(&ProbeContext { doc, view }, PROBES)
}

/// Run `probes` in order; first verdict wins, default is not mirrored.
pub fn resolve(ctx: &ProbeContext<'_>, probes: &[(&str, OrientationProbe)]) -> bool {
    for &(name, probe) in probes {
        match probe(ctx) {
            Ok(Some(mirrored)) => {
                debug!(probe = name, mirrored, "Orientation resolved");
                return mirrored;
            }
            Ok(None) => {}
            Err(e) => debug!(probe = name, error = %e, "Orientation probe failed"),
        }
    }
    false
}

/// `flipped` attribute or class on the view element.
pub fn explicit_flag(ctx: &ProbeContext<'_>) -> Result<Option<bool>, OverlayError> {
    let element = ctx
        .doc
        .element(ctx.view)
        .ok_or(OverlayError::StaleNode(ctx.view))?;
    // Boolean attribute: presence decides, whatever the value
    let attr_set = element.attrs.contains_key("flipped");
    let class_set = element.classes.iter().any(|c| c == "flipped");
    Ok((attr_set || class_set).then_some(true))
}

/// A host board controller in the global scope reporting black orientation.
pub fn global_controller(ctx: &ProbeContext<'_>) -> Result<Option<bool>, OverlayError> {
    let globals = ctx.doc.globals();
    for name in CONTROLLER_GLOBALS {
        let Some(controller) = globals.get(*name).filter(|v| !v.is_null()) else {
            continue;
        };
        let nested = controller.get("board").and_then(|b| b.get("orientation"));
        let direct = controller.get("orientation");
        if [nested, direct].into_iter().flatten().any(is_black) {
            return Ok(Some(true));
        }
    }
    Ok(None)
}

fn is_black(value: &Value) -> bool {
    value.as_str() == Some("black")
}

/// Where the rank-1 coordinate label sits: upper half means mirrored.
pub fn coordinate_labels(ctx: &ProbeContext<'_>) -> Result<Option<bool>, OverlayError> {
    if !ctx.doc.contains(ctx.view) {
        return Err(OverlayError::StaleNode(ctx.view));
    }
    let labels = ctx.doc.query_all(ctx.view, &COORDINATE_LABELS);
    if labels.len() < MIN_COORDINATE_LABELS {
        return Ok(None);
    }
    for label in labels {
        if ctx.doc.text_content(label).trim() != "1" {
            continue;
        }
        let y = ctx
            .doc
            .attr(label, "y")
            .and_then(|y| y.trim().parse::<f64>().ok())
            .filter(|y| !y.is_nan());
        if let Some(y) = y {
            return Ok(Some(y < 50.0));
        }
    }
    Ok(None)
}
