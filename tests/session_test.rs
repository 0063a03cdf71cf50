//! End-to-end session tests against an in-process mock detection service.
//!
//! The mock speaks the real wire contract: it consumes
//! `{"type":"video_frame","image":...}` text messages and replies with the
//! bare base64 payload, like the deployed service does.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use url::Url;

use lanewatch::camera::PatternProvider;
use lanewatch::protocol::DecodedFrame;
use lanewatch::render::{self, RenderSurface};
use lanewatch::session::{SessionController, SessionStatus, StreamSettings};

/// What the mock sends back for each received frame.
#[derive(Clone, Copy)]
enum Reply {
    /// Echo the frame payload bare, like the real service.
    Echo,
    /// An undecodable payload.
    Garbage,
}

struct MockService {
    url: Url,
    frames_received: Arc<AtomicUsize>,
}

impl MockService {
    async fn spawn(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames_received = Arc::new(AtomicUsize::new(0));

        let frames = frames_received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let frames = frames.clone();
                tokio::spawn(async move {
                    let ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    let (mut ws_tx, mut ws_rx) = ws.split();
                    while let Some(Ok(msg)) = ws_rx.next().await {
                        if let Message::Text(text) = msg {
                            let value: serde_json::Value = match serde_json::from_str(&text) {
                                Ok(value) => value,
                                Err(_) => continue,
                            };
                            if value["type"] != "video_frame" {
                                continue;
                            }
                            frames.fetch_add(1, Ordering::SeqCst);
                            let response = match reply {
                                Reply::Echo => {
                                    value["image"].as_str().unwrap_or_default().to_string()
                                }
                                Reply::Garbage => "!!! not an image !!!".to_string(),
                            };
                            if ws_tx.send(Message::Text(response)).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        MockService {
            url: Url::parse(&format!("ws://{addr}/")).unwrap(),
            frames_received,
        }
    }

    fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::SeqCst)
    }
}

/// Records resizes and draws, standing in for the visible output surface.
struct TestSurface {
    dims: Arc<Mutex<(u32, u32)>>,
    draws: Arc<AtomicUsize>,
}

impl RenderSurface for TestSurface {
    fn resize(&mut self, width: u32, height: u32) {
        *self.dims.lock().unwrap() = (width, height);
    }

    fn draw(&mut self, _frame: &DecodedFrame) -> anyhow::Result<()> {
        self.draws.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    controller: Arc<SessionController>,
    service: MockService,
    camera_stats: Arc<lanewatch::camera::PatternStats>,
    surface_dims: Arc<Mutex<(u32, u32)>>,
    surface_draws: Arc<AtomicUsize>,
}

async fn harness_with(reply: Reply, provider: PatternProvider) -> Harness {
    let service = MockService::spawn(reply).await;
    let camera_stats = provider.stats();

    let surface_dims = Arc::new(Mutex::new((0, 0)));
    let surface_draws = Arc::new(AtomicUsize::new(0));
    let surface = render::shared(Box::new(TestSurface {
        dims: surface_dims.clone(),
        draws: surface_draws.clone(),
    }));

    let controller = Arc::new(SessionController::new(
        StreamSettings {
            endpoint: service.url.clone(),
            interval: Duration::from_millis(20),
            jpeg_quality: 80,
        },
        Arc::new(provider),
        surface,
    ));

    Harness {
        controller,
        service,
        camera_stats,
        surface_dims,
        surface_draws,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_end_to_end_stream_then_stop() {
    let h = harness_with(Reply::Echo, PatternProvider::new(64, 48)).await;

    h.controller.start().await.unwrap();
    assert_eq!(h.controller.status(), SessionStatus::Active);
    assert_eq!(h.controller.epoch(), 1);
    assert_eq!(h.camera_stats.live(), 1);

    // frames flow out on the capture cadence and annotated frames come back
    wait_until(|| h.service.frames_received() >= 2, "frames at the service").await;
    wait_until(
        || h.surface_draws.load(Ordering::SeqCst) >= 1,
        "annotated frames on the surface",
    )
    .await;
    assert_eq!(*h.surface_dims.lock().unwrap(), (64, 48));

    h.controller.stop();
    assert_eq!(h.controller.status(), SessionStatus::Idle);
    // camera released exactly once by the time stop() returns
    assert_eq!(h.camera_stats.acquired(), 1);
    assert_eq!(h.camera_stats.released(), 1);

    // and the capture timer is cancelled: no further sends on the channel
    sleep(Duration::from_millis(100)).await;
    let frames_after_stop = h.service.frames_received();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.service.frames_received(),
        frames_after_stop,
        "no sends after stop() returned"
    );
}

#[tokio::test]
async fn test_start_while_active_is_noop() {
    let h = harness_with(Reply::Echo, PatternProvider::new(32, 32)).await;

    h.controller.start().await.unwrap();
    h.controller.start().await.unwrap();

    assert_eq!(h.controller.epoch(), 1, "second start must not begin a new run");
    assert_eq!(h.camera_stats.acquired(), 1, "camera never acquired twice");

    h.controller.stop();
    assert_eq!(h.camera_stats.released(), 1);
}

#[tokio::test]
async fn test_repeated_toggle_cycles_balance_acquisitions() {
    let h = harness_with(Reply::Echo, PatternProvider::new(32, 32)).await;

    for _ in 0..3 {
        h.controller.toggle().await.unwrap();
        assert_eq!(h.controller.status(), SessionStatus::Active);
        h.controller.toggle().await.unwrap();
        assert_eq!(h.controller.status(), SessionStatus::Idle);
    }

    assert_eq!(h.camera_stats.acquired(), 3);
    assert_eq!(h.camera_stats.released(), 3);
    assert_eq!(h.controller.epoch(), 3);
}

#[tokio::test]
async fn test_toggle_twice_while_acquiring_does_not_go_active() {
    let provider =
        PatternProvider::new(32, 32).with_acquire_delay(Duration::from_millis(200));
    let h = harness_with(Reply::Echo, provider).await;

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.toggle().await });

    // second toggle lands while the first is still acquiring
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.controller.status(), SessionStatus::Acquiring);
    h.controller.toggle().await.unwrap();

    first.await.unwrap().unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(h.controller.status(), SessionStatus::Idle);
    assert_eq!(h.controller.epoch(), 1, "superseded epoch must not drive anything");
    assert_eq!(h.camera_stats.live(), 0, "late acquisition was released");
    assert_eq!(h.service.frames_received(), 0, "no capture loop was armed");
}

#[tokio::test]
async fn test_undecodable_replies_leave_session_active() {
    let h = harness_with(Reply::Garbage, PatternProvider::new(32, 32)).await;

    h.controller.start().await.unwrap();
    wait_until(|| h.service.frames_received() >= 3, "frames at the service").await;

    // every reply failed to decode, the stream and the state machine carry on
    assert_eq!(h.controller.status(), SessionStatus::Active);
    assert_eq!(h.surface_draws.load(Ordering::SeqCst), 0);

    h.controller.stop();
    assert_eq!(h.camera_stats.live(), 0);
}

#[tokio::test]
async fn test_camera_warmup_defers_first_send() {
    let provider = PatternProvider::new(32, 32).with_warmup(Duration::from_millis(150));
    let h = harness_with(Reply::Echo, provider).await;

    h.controller.start().await.unwrap();

    // while dimensions report (0, 0) every cycle is skipped
    sleep(Duration::from_millis(80)).await;
    assert_eq!(h.service.frames_received(), 0, "no sends before negotiation");

    // once negotiated, frames flow
    wait_until(|| h.service.frames_received() >= 1, "first frame after warmup").await;
    h.controller.stop();
}
