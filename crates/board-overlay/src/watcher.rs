//! Re-attaches the overlay layers when the host replaces the board view.

use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId};
use crate::locator;
use crate::render::{self, OverlayLayers};

/// Notification that the host changed the tree's structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationBatch {
    /// Document generation after the host's changes.
    pub generation: u64,
}

impl MutationBatch {
    pub fn of(doc: &Document) -> Self {
        Self {
            generation: doc.generation(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ViewWatcher {
    handled_generation: Option<u64>,
    attached: Option<NodeId>,
}

impl ViewWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// View the layers were last attached to.
    pub fn attached(&self) -> Option<NodeId> {
        self.attached
    }

    /// Re-resolve the view and make sure its layers exist.
    pub fn on_mutations(&mut self, doc: &mut Document, batch: MutationBatch) -> Option<OverlayLayers> {
        if self
            .handled_generation
            .is_some_and(|handled| batch.generation <= handled)
        {
            debug!(generation = batch.generation, "Mutation batch already handled");
            return None;
        }

        let layers = self.refresh(doc);
        // Attaching layers is itself a mutation; don't react to it again
        self.handled_generation = Some(doc.generation());
        layers
    }

    /// Attach layers to the currently located view, if any.
    pub fn refresh(&mut self, doc: &mut Document) -> Option<OverlayLayers> {
        let Some(view) = locator::locate(doc) else {
            if self.attached.take().is_some() {
                info!("Board view disappeared");
            }
            return None;
        };

        match render::ensure_layers(doc, view) {
            Ok(layers) => {
                if self.attached != Some(view) {
                    info!(?view, "Attached overlay to board view");
                    self.attached = Some(view);
                }
                Some(layers)
            }
            Err(e) => {
                warn!(error = %e, "Failed to attach overlay layers");
                None
            }
        }
    }
}
