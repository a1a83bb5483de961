//! The overlay runtime: one cooperative loop over channel events, the push
//! ticker and host mutation batches.
//!
//! Every handler borrows the shared document synchronously and releases it
//! before awaiting, so the host can mutate the tree between handlers.

use std::future::Future;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::candidates::{self, RawCandidate};
use crate::config::CoachConfig;
use crate::dom::SharedDocument;
use crate::locator;
use crate::notation;
use crate::orientation;
use crate::render;
use crate::sync::{parse_inbound, ChannelEvent, Inbound, PushOutcome, SyncChannel};
use crate::watcher::{MutationBatch, ViewWatcher};

pub struct OverlayCoach {
    config: CoachConfig,
    doc: SharedDocument,
    channel: SyncChannel,
    watcher: ViewWatcher,
}

impl OverlayCoach {
    pub fn new(config: CoachConfig, doc: SharedDocument) -> Self {
        let channel = SyncChannel::new(config.ws_url.clone(), config.reconnect_delay);
        Self {
            config,
            doc,
            channel,
            watcher: ViewWatcher::new(),
        }
    }

    /// Run until `shutdown` resolves. The mutation stream may close early;
    /// the loop keeps serving the channel and the ticker.
    pub async fn run<F>(mut self, mut mutations: UnboundedReceiver<MutationBatch>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(url = %self.config.ws_url, "Overlay coach starting");
        self.channel.start();
        self.watcher.refresh(&mut self.doc.borrow_mut());

        let mut ticker = tokio::time::interval(self.config.push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        let mut host_attached = true;

        loop {
            tokio::select! {
                event = self.channel.next_event() => self.on_channel_event(event),
                _ = ticker.tick() => self.on_tick().await,
                batch = mutations.recv(), if host_attached => match batch {
                    Some(batch) => self.on_mutations(batch),
                    None => {
                        debug!("Mutation stream closed");
                        host_attached = false;
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        self.channel.stop().await;
        info!("Overlay coach stopped");
    }

    fn on_mutations(&mut self, batch: MutationBatch) {
        let mut doc = self.doc.borrow_mut();
        self.watcher.on_mutations(&mut doc, batch);
    }

    /// Sample the move list and push it if it changed.
    async fn on_tick(&mut self) {
        let moves = {
            let doc = self.doc.borrow();
            if locator::locate(&doc).is_none() {
                debug!("No board view; skipping sample");
                return;
            }
            notation::extract_notation(&doc, doc.root())
        };

        match self.channel.push(&moves).await {
            PushOutcome::Sent => debug!(plies = moves.len(), "Move sequence synced"),
            PushOutcome::Deferred => debug!("Not connected; sync deferred"),
            PushOutcome::Unchanged | PushOutcome::Failed => {}
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(text) => match parse_inbound(&text) {
                Ok(Inbound::Reset) => self.clear(),
                Ok(Inbound::Candidates(raw)) => self.paint(&raw),
                Ok(Inbound::Rejected(reason)) => {
                    warn!(reason = %reason, "Analysis source rejected the move sequence")
                }
                Err(e) => warn!(error = %e, "Dropping malformed analysis message"),
            },
            ChannelEvent::Connected => {}
            ChannelEvent::ConnectFailed(_) | ChannelEvent::Closed(_) => {
                debug!(state = ?self.channel.state(), "Channel down")
            }
        }
    }

    fn clear(&mut self) {
        let mut doc = self.doc.borrow_mut();
        let Some(view) = locator::locate(&doc) else {
            return;
        };
        if let Some(layers) = render::find_layers(&doc, view) {
            render::clear_layers(&mut doc, layers);
            debug!("Overlay reset");
        }
    }

    fn paint(&mut self, raw: &[RawCandidate]) {
        let set = candidates::select_top(raw, self.config.max_display);
        let mut doc = self.doc.borrow_mut();
        let Some(view) = locator::locate(&doc) else {
            debug!("No board view; dropping candidates");
            return;
        };
        let mirrored = orientation::is_mirrored(&doc, view);

        match render::render(&mut doc, view, &set, mirrored) {
            Ok(layers) => debug!(
                candidates = set.len(),
                mirrored,
                beneath = %doc.outer_html(layers.beneath),
                above = %doc.outer_html(layers.above),
                "Rendered candidates"
            ),
            Err(e) => warn!(error = %e, "Failed to render candidates"),
        }
    }
}
