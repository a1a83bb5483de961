//! Shared helpers: host pages and an in-process fake analysis source.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use tokio::sync::{mpsc, oneshot, watch};

use board_overlay::render::{find_layers, OverlayLayers};
use board_overlay::selector::Selector;
use board_overlay::{
    locator, CoachConfig, Document, DocumentSnapshot, ElementSpec, MutationBatch, OverlayCoach,
    SharedDocument,
};

// ---------------------------------------------------------------------------
// Host pages
// ---------------------------------------------------------------------------

/// One move cell; a leading piece letter becomes a figurine marker.
pub fn move_cell(side: &str, san: &str) -> ElementSpec {
    let mut content = ElementSpec::new("span").class("node-highlight-content");
    let mut text = san;
    if let Some(first) = san.chars().next() {
        if "NBRQK".contains(first) {
            content = content.child(
                ElementSpec::new("span")
                    .class("icon-font-chess")
                    .attr("data-figurine", &first.to_string()),
            );
            text = &san[1..];
        }
    }
    ElementSpec::new("div")
        .class(&format!("{side}-move node"))
        .child(content.text(text))
}

fn move_row(white: &str, black: Option<&str>) -> ElementSpec {
    let mut row = ElementSpec::new("div")
        .class("main-line-row move-list-row")
        .child(move_cell("white", white));
    if let Some(black) = black {
        row = row.child(move_cell("black", black));
    }
    row
}

/// A page with a live board and a move list holding `sans`.
pub fn page_with_board(board: ElementSpec, sans: &[&str]) -> ElementSpec {
    let mut list = ElementSpec::new("wc-simple-move-list");
    for pair in sans.chunks(2) {
        list = list.child(move_row(pair[0], pair.get(1).copied()));
    }
    ElementSpec::new("body").child(board).child(list)
}

pub fn board() -> ElementSpec {
    ElementSpec::new("wc-chess-board")
        .id("board-play")
        .class("board")
        .child(ElementSpec::new("div").class("piece wp square-52"))
        .child(ElementSpec::new("div").class("piece bk square-58"))
}

pub fn page(sans: &[&str]) -> ElementSpec {
    page_with_board(board(), sans)
}

/// Append a move-list row in place, leaving the board view untouched.
pub fn append_row(doc: &mut Document, white: &str, black: Option<&str>) {
    let selector: Selector = "wc-simple-move-list".parse().unwrap();
    let list = doc.query(doc.root(), &selector).expect("page has a move list");
    let row = doc.create_subtree(&move_row(white, black));
    doc.append_child(list, row).unwrap();
}

pub fn shared(body: ElementSpec) -> SharedDocument {
    Document::from_snapshot(DocumentSnapshot {
        globals: Default::default(),
        body,
    })
    .into_shared()
}

/// Layers on the currently located board view.
pub fn layers(doc: &Document) -> Option<OverlayLayers> {
    find_layers(doc, locator::locate(doc)?)
}

/// (beneath, above) child counts, zero when there are no layers.
pub fn painted(doc: &Document) -> (usize, usize) {
    layers(doc)
        .map(|l| (doc.children(l.beneath).len(), doc.children(l.above).len()))
        .unwrap_or((0, 0))
}

/// Label texts on the above layer.
pub fn labels(doc: &Document) -> Vec<String> {
    layers(doc)
        .map(|l| {
            doc.children(l.above)
                .iter()
                .map(|&t| doc.text_content(t))
                .collect()
        })
        .unwrap_or_default()
}

pub fn config(url: &str) -> CoachConfig {
    CoachConfig::default()
        .with_ws_url(url)
        .expect("fake source URL is a websocket URL")
}

/// Run an overlay coach on `doc` against `url` until `driver` finishes.
pub async fn drive(
    url: &str,
    doc: &SharedDocument,
    mutations: mpsc::UnboundedReceiver<MutationBatch>,
    driver: impl Future<Output = ()>,
) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let coach = OverlayCoach::new(config(url), doc.clone());
    tokio::join!(
        coach.run(mutations, async {
            let _ = stop_rx.await;
        }),
        async {
            driver.await;
            let _ = stop_tx.send(());
        }
    );
}

pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Fake analysis source
// ---------------------------------------------------------------------------

type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
struct FakeState {
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<usize>>,
    kick: Arc<watch::Sender<u64>>,
    responder: Responder,
}

/// Websocket server on 127.0.0.1 that records every inbound text message
/// and answers through `responder`.
pub struct FakeSource {
    pub url: String,
    state: FakeState,
}

impl FakeSource {
    pub async fn start(responder: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::start_on(0, responder).await
    }

    /// Like [`start`](Self::start) on a fixed port (0 picks a free one).
    pub async fn start_on(
        port: u16,
        responder: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("Failed to bind fake source");
        let addr = listener.local_addr().expect("Fake source has no address");

        let (kick, _) = watch::channel(0u64);
        let state = FakeState {
            received: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(Mutex::new(0)),
            kick: Arc::new(kick),
            responder: Arc::new(responder),
        };
        let app = Router::new()
            .route("/", get(ws_handler))
            .layer(Extension(state.clone()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake source failed");
        });

        Self {
            url: format!("ws://{addr}"),
            state,
        }
    }

    /// Source that never answers.
    pub async fn silent() -> Self {
        Self::start(|_| None).await
    }

    /// Every message received so far, decoded as move lists.
    pub fn received(&self) -> Vec<Vec<String>> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|m| serde_json::from_str(m).expect("client sent a move list"))
            .collect()
    }

    pub fn received_count(&self) -> usize {
        self.state.received.lock().unwrap().len()
    }

    pub fn connections(&self) -> usize {
        *self.state.connections.lock().unwrap()
    }

    /// Close every open connection from the server side.
    pub fn kick(&self) {
        self.state.kick.send_modify(|n| *n += 1);
    }
}

async fn ws_handler(ws: WebSocketUpgrade, Extension(state): Extension<FakeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(mut socket: WebSocket, state: FakeState) {
    let mut kicks = state.kick.subscribe();
    *state.connections.lock().unwrap() += 1;

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(t))) => {
                    let text = t.to_string();
                    state.received.lock().unwrap().push(text.clone());
                    if let Some(reply) = (state.responder)(&text) {
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            _ = kicks.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }
}
