//! Inbound analysis rendered onto the board view.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use board_overlay::{ElementSpec, MutationBatch};

const DUPLICATE_DESTINATIONS: &str = r#"{"pvs": [
    {"move": "e2e4", "score_cp": 35, "mate": null},
    {"move": "d2d4", "score_cp": 20, "mate": null},
    {"move": "e2e4", "score_cp": 999, "mate": null}
], "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"}"#;

/// Answers the first message with `first`, every later one with `rest`.
fn scripted(first: &'static str, rest: &'static str) -> impl Fn(&str) -> Option<String> + Send + Sync {
    let calls = AtomicUsize::new(0);
    move |_| {
        let reply = if calls.fetch_add(1, Ordering::SeqCst) == 0 { first } else { rest };
        Some(reply.to_string())
    }
}

#[tokio::test]
async fn test_duplicate_destination_renders_two_pairs() {
    let source = common::FakeSource::start(|_| Some(DUPLICATE_DESTINATIONS.to_string())).await;
    let doc = common::shared(common::page(&[]));
    let (_mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    common::drive(&source.url, &doc, mutations_rx, async {
        assert!(common::wait_until(Duration::from_secs(3), || common::painted(&doc.borrow()) == (4, 2)).await);
        assert_eq!(common::labels(&doc.borrow()), vec!["0.35", "0.20"]);

        let d = doc.borrow();
        let layers = common::layers(&d).unwrap();
        let rects = d.children(layers.beneath);
        // Best candidate in green, second in red
        assert_eq!(d.attr(rects[0], "stroke"), Some("rgb(0,255,0)"));
        assert_eq!(d.attr(rects[3], "stroke"), Some("rgb(255,0,0)"));
    })
    .await;
}

#[tokio::test]
async fn test_reset_clears_both_layers() {
    let source = common::FakeSource::start(scripted(DUPLICATE_DESTINATIONS, r#"{"status": "reset"}"#)).await;
    let doc = common::shared(common::page(&["e4", "e5"]));
    let (_mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    common::drive(&source.url, &doc, mutations_rx, async {
        assert!(common::wait_until(Duration::from_secs(3), || common::painted(&doc.borrow()) == (4, 2)).await);

        common::append_row(&mut doc.borrow_mut(), "Nf3", None);
        assert!(common::wait_until(Duration::from_secs(3), || common::painted(&doc.borrow()) == (0, 0)).await);
        assert_eq!(source.received_count(), 2);
        assert!(common::layers(&doc.borrow()).is_some());
    })
    .await;
}

#[tokio::test]
async fn test_mirrored_board_is_painted_from_the_other_side() {
    let source = common::FakeSource::start(|_| {
        Some(r#"{"pvs": [{"move": "e2e4", "score_cp": 35}]}"#.to_string())
    })
    .await;
    let flipped = common::board().class("flipped");
    let doc = common::shared(common::page_with_board(flipped, &[]));
    let (_mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    common::drive(&source.url, &doc, mutations_rx, async {
        assert!(common::wait_until(Duration::from_secs(3), || common::painted(&doc.borrow()) == (2, 1)).await);
        let d = doc.borrow();
        let layers = common::layers(&d).unwrap();
        let source_rect = d.children(layers.beneath)[0];
        assert_eq!(d.attr(source_rect, "x"), Some("37.5"));
        assert_eq!(d.attr(source_rect, "y"), Some("12.5"));
        let label = d.children(layers.above)[0];
        assert_eq!(d.attr(label, "y"), Some("43.75"));
    })
    .await;
}

#[tokio::test]
async fn test_malformed_message_keeps_display_and_connection() {
    let source = common::FakeSource::start(scripted(DUPLICATE_DESTINATIONS, "{not json")).await;
    let doc = common::shared(common::page(&["e4"]));
    let (_mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    common::drive(&source.url, &doc, mutations_rx, async {
        assert!(common::wait_until(Duration::from_secs(3), || common::painted(&doc.borrow()) == (4, 2)).await);

        common::append_row(&mut doc.borrow_mut(), "d4", None);
        assert!(common::wait_until(Duration::from_secs(3), || source.received_count() == 2).await);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(common::painted(&doc.borrow()), (4, 2));
        assert_eq!(source.connections(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_layers_reattached_after_host_replaces_board() {
    let source = common::FakeSource::silent().await;
    let doc = common::shared(common::page(&[]));
    let (mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    common::drive(&source.url, &doc, mutations_rx, async {
        // Attached at startup, before any analysis arrives
        assert!(common::wait_until(Duration::from_secs(1), || common::layers(&doc.borrow()).is_some()).await);

        let replacement = ElementSpec::new("div").class("board-layout-main").child(
            ElementSpec::new("wc-chess-board")
                .id("board-play-computer")
                .child(ElementSpec::new("div").class("piece wk square-51")),
        );
        let batch = {
            let mut d = doc.borrow_mut();
            d.replace_body(&ElementSpec::new("body").child(replacement));
            MutationBatch::of(&d)
        };
        assert!(common::layers(&doc.borrow()).is_none());

        mutations_tx.send(batch).unwrap();
        assert!(common::wait_until(Duration::from_secs(1), || common::layers(&doc.borrow()).is_some()).await);

        let d = doc.borrow();
        let view = board_overlay::locator::locate(&d).unwrap();
        assert_eq!(d.element(view).unwrap().id.as_deref(), Some("board-play-computer"));
        let layers = common::layers(&d).unwrap();
        let children = d.children(view);
        assert_eq!(children[0], layers.beneath);
        assert_eq!(*children.last().unwrap(), layers.above);
    })
    .await;
}
