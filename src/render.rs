//! Inbound frame rendering.
//!
//! Each inbound payload is decoded off the runtime, then drawn to the
//! session's [`RenderSurface`]. The surface is resized to the decoded
//! dimensions before every draw, so a full-frame overwrite needs no separate
//! clear step. A frame that fails to decode is dropped; the next one is
//! rendered as usual.

use image::codecs::jpeg::JpegEncoder;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{self, DecodedFrame};

pub trait RenderSurface: Send {
    /// Resize the visible surface; called with the decoded frame's
    /// dimensions before every draw.
    fn resize(&mut self, width: u32, height: u32);

    /// Draw a full frame, overwriting prior contents.
    fn draw(&mut self, frame: &DecodedFrame) -> anyhow::Result<()>;
}

/// The output surface, shared between the session (which keeps it across
/// start/stop cycles) and the renderer task of the currently active run.
pub type SharedSurface = Arc<Mutex<Box<dyn RenderSurface>>>;

pub fn shared(surface: Box<dyn RenderSurface>) -> SharedSurface {
    Arc::new(Mutex::new(surface))
}

/// Decodes and counts frames without persisting them. The default surface
/// for headless runs.
pub struct DiscardSurface {
    width: u32,
    height: u32,
    frames: Arc<AtomicU64>,
}

impl DiscardSurface {
    pub fn new() -> Self {
        DiscardSurface {
            width: 0,
            height: 0,
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared draw counter, usable after the surface moved into a session.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames)
    }
}

impl Default for DiscardSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for DiscardSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn draw(&mut self, _frame: &DecodedFrame) -> anyhow::Result<()> {
        let n = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 100 == 0 {
            debug!(frames = n, width = self.width, height = self.height, "annotated frames rendered");
        }
        Ok(())
    }
}

/// Persists the latest annotated frame to a file (tmp-write then rename, so
/// readers never observe a partial image).
pub struct FileSurface {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl FileSurface {
    pub fn new(path: PathBuf) -> Self {
        FileSurface {
            path,
            width: 0,
            height: 0,
        }
    }
}

impl RenderSurface for FileSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn draw(&mut self, frame: &DecodedFrame) -> anyhow::Result<()> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90).encode(
            frame.pixels.as_raw(),
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )?;

        let tmp = self.path.with_extension("jpg.tmp");
        std::fs::write(&tmp, &jpeg)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Runs until the inbound sender is dropped (channel closed) or the owning
/// session aborts the task.
pub(crate) async fn run_renderer(surface: SharedSurface, mut inbound_rx: mpsc::Receiver<String>) {
    while let Some(payload) = inbound_rx.recv().await {
        let decoded = tokio::task::spawn_blocking(move || protocol::decode_frame(&payload)).await;

        match decoded {
            Ok(Ok(frame)) => {
                let mut surface = surface.lock();
                surface.resize(frame.width, frame.height);
                if let Err(e) = surface.draw(&frame) {
                    warn!(error = %e, "surface draw failed");
                }
            }
            // One bad frame must not disrupt the stream.
            Ok(Err(e)) => debug!(error = %e, "undecodable frame dropped"),
            Err(_) => break,
        }
    }
}
