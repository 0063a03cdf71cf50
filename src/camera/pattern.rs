//! Synthetic test-pattern camera.
//!
//! The moral equivalent of GStreamer's `videotestsrc`: a moving gradient at a
//! fixed resolution. Useful for running the full pipeline without hardware,
//! and for tests that need to observe acquisition/release behavior.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{CameraError, CameraProvider, CameraSource};

/// Acquisition accounting shared between a provider and its sources.
#[derive(Debug, Default)]
pub struct PatternStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl PatternStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Sources currently live (acquired and not yet dropped).
    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }
}

pub struct PatternProvider {
    width: u32,
    height: u32,
    warmup: Duration,
    acquire_delay: Duration,
    deny: Mutex<bool>,
    stats: Arc<PatternStats>,
}

impl PatternProvider {
    pub fn new(width: u32, height: u32) -> Self {
        PatternProvider {
            width,
            height,
            warmup: Duration::ZERO,
            acquire_delay: Duration::ZERO,
            deny: Mutex::new(false),
            stats: Arc::new(PatternStats::default()),
        }
    }

    /// Report `(0, 0)` dimensions for this long after acquisition, modelling
    /// a device that has not negotiated a resolution yet.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Make `acquire` itself take this long, modelling a slow permission
    /// prompt or device open.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Make subsequent acquisitions fail with `PermissionDenied`.
    pub fn set_deny(&self, deny: bool) {
        *self.deny.lock() = deny;
    }

    pub fn stats(&self) -> Arc<PatternStats> {
        Arc::clone(&self.stats)
    }
}

impl CameraProvider for PatternProvider {
    fn acquire(&self) -> Result<Box<dyn CameraSource>, CameraError> {
        if !self.acquire_delay.is_zero() {
            std::thread::sleep(self.acquire_delay);
        }
        if *self.deny.lock() {
            return Err(CameraError::PermissionDenied(
                "pattern source configured to deny".to_string(),
            ));
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(width = self.width, height = self.height, "pattern camera acquired");
        Ok(Box::new(PatternCamera {
            width: self.width,
            height: self.height,
            ready_at: Instant::now() + self.warmup,
            frame_count: 0,
            stats: Some(Arc::clone(&self.stats)),
        }))
    }
}

#[derive(Debug)]
pub struct PatternCamera {
    width: u32,
    height: u32,
    ready_at: Instant,
    frame_count: u64,
    stats: Option<Arc<PatternStats>>,
}

impl PatternCamera {
    /// Standalone source without provider accounting.
    pub fn new(width: u32, height: u32) -> Self {
        PatternCamera {
            width,
            height,
            ready_at: Instant::now(),
            frame_count: 0,
            stats: None,
        }
    }
}

impl CameraSource for PatternCamera {
    fn dimensions(&self) -> (u32, u32) {
        if Instant::now() < self.ready_at {
            (0, 0)
        } else {
            (self.width, self.height)
        }
    }

    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<(u32, u32), CameraError> {
        let (w, h) = self.dimensions();
        if w == 0 || h == 0 {
            return Err(CameraError::Device("resolution not negotiated".to_string()));
        }

        self.frame_count += 1;
        let shift = (self.frame_count * 4) as u32;

        buf.clear();
        buf.reserve((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                buf.push(((x + shift) % 256) as u8);
                buf.push(((y + shift) % 256) as u8);
                buf.push((((x + y) / 2) % 256) as u8);
            }
        }
        Ok((w, h))
    }
}

impl Drop for PatternCamera {
    fn drop(&mut self) {
        if let Some(stats) = self.stats.take() {
            stats.released.fetch_add(1, Ordering::SeqCst);
        }
        debug!(frames = self.frame_count, "pattern camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_pattern_frame_size() {
        let mut camera = PatternCamera::new(64, 48);
        let mut buf = Vec::new();
        let (w, h) = camera.read_frame(&mut buf).unwrap();
        assert_eq!((w, h), (64, 48));
        assert_eq!(buf.len(), 64 * 48 * 3);
    }

    #[test]
    fn test_warmup_reports_zero_dimensions() {
        let provider = PatternProvider::new(64, 48).with_warmup(Duration::from_secs(60));
        let camera = provider.acquire().unwrap();
        assert_eq!(camera.dimensions(), (0, 0));
    }

    #[test]
    fn test_deny_maps_to_permission_denied() {
        let provider = PatternProvider::new(64, 48);
        provider.set_deny(true);
        assert_matches!(provider.acquire(), Err(CameraError::PermissionDenied(_)));
        assert_eq!(provider.stats().acquired(), 0);
    }

    #[test]
    fn test_stats_track_acquire_and_release() {
        let provider = PatternProvider::new(32, 32);
        let stats = provider.stats();
        let camera = provider.acquire().unwrap();
        assert_eq!(stats.live(), 1);
        drop(camera);
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.acquired(), 1);
        assert_eq!(stats.released(), 1);
    }
}
