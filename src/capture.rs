//! Fixed-period capture loop.
//!
//! One tick = read current camera frame, JPEG-encode, base64-encode, hand to
//! the channel. Ticks are independent: nothing is carried between them, a
//! send is never awaited, and a missed tick is skipped rather than bunched.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::protocol::{self, ClientMessage};
use crate::session::SharedCamera;
use crate::transport::ChannelSender;

/// Runs until the owning session aborts the task.
pub(crate) async fn run_capture_loop(
    camera: SharedCamera,
    sender: ChannelSender,
    interval: Duration,
    jpeg_quality: u8,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let camera = camera.clone();
        let encoded =
            tokio::task::spawn_blocking(move || capture_and_encode(&camera, jpeg_quality)).await;

        match encoded {
            Ok(Some(image)) => sender.send(&ClientMessage::VideoFrame { image }),
            Ok(None) => {}
            Err(_) => break,
        }
    }
}

/// One capture-encode cycle. Returns `None` when the cycle must be skipped:
/// camera released, resolution not negotiated yet, or a per-tick read error.
pub(crate) fn capture_and_encode(camera: &SharedCamera, jpeg_quality: u8) -> Option<String> {
    // Off-screen buffer, sized by the camera to its natural dimensions each
    // cycle so mid-session resolution changes are tolerated.
    let mut buf = Vec::new();

    let (width, height) = {
        let mut slot = camera.lock();
        let source = slot.as_mut()?;

        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            trace!("camera resolution not negotiated, skipping cycle");
            return None;
        }

        match source.read_frame(&mut buf) {
            Ok(dims) => dims,
            Err(e) => {
                debug!(error = %e, "frame read failed, skipping cycle");
                return None;
            }
        }
    };

    if width == 0 || height == 0 {
        return None;
    }

    match protocol::encode_frame(&buf, width, height, jpeg_quality) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(error = %e, "frame encoding failed, skipping cycle");
            None
        }
    }
}
