//! Headless host for the overlay coach.
//!
//! Loads a document snapshot, shares it with the runtime and reloads it
//! whenever the file changes on disk, as if the host page had re-rendered.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use board_overlay::{CoachConfig, DocumentSnapshot, MutationBatch, OverlayCoach, SharedDocument};

const SNAPSHOT_POLL: Duration = Duration::from_secs(1);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = CoachConfig::from_env()?;
    let snapshot_path = config
        .snapshot
        .clone()
        .context("COACH_SNAPSHOT must point at a document snapshot")?;

    let snapshot = DocumentSnapshot::load(&snapshot_path)
        .await
        .with_context(|| format!("Failed to load {}", snapshot_path.display()))?;
    let doc = board_overlay::Document::from_snapshot(snapshot).into_shared();
    info!(path = %snapshot_path.display(), "Loaded document snapshot");

    let (mutations_tx, mutations_rx) = tokio::sync::mpsc::unbounded_channel();
    let coach = OverlayCoach::new(config, doc.clone());
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, shutting down");
    };

    tokio::select! {
        _ = coach.run(mutations_rx, shutdown) => {}
        _ = watch_snapshot(snapshot_path, doc, mutations_tx) => {}
    }
    Ok(())
}

/// Replace the document body whenever the snapshot file is rewritten.
async fn watch_snapshot(path: PathBuf, doc: SharedDocument, mutations: UnboundedSender<MutationBatch>) {
    let mut last_modified = modified(&path).await;
    let mut ticker = tokio::time::interval(SNAPSHOT_POLL);
    loop {
        ticker.tick().await;
        let current = modified(&path).await;
        if current.is_none() || current == last_modified {
            continue;
        }
        last_modified = current;

        match DocumentSnapshot::load(&path).await {
            Ok(snapshot) => {
                let batch = {
                    let mut doc = doc.borrow_mut();
                    *doc.globals_mut() = snapshot.globals;
                    doc.replace_body(&snapshot.body);
                    MutationBatch::of(&doc)
                };
                info!(path = %path.display(), "Snapshot changed, host tree replaced");
                if mutations.send(batch).is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "Failed to reload snapshot"),
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
