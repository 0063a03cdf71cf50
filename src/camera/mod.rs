//! Camera sources.
//!
//! A session owns exactly one camera source at a time, obtained through a
//! [`CameraProvider`]. Two backends exist:
//! - [`PatternCamera`], a synthetic moving test pattern needing no hardware
//! - a GStreamer device source (feature: camera-gstreamer)

#[cfg(feature = "camera-gstreamer")]
pub mod gst;
mod pattern;

pub use pattern::{PatternCamera, PatternProvider, PatternStats};

#[cfg(feature = "camera-gstreamer")]
pub use gst::GstProvider;

use thiserror::Error;

use crate::config::CameraConfig;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("camera device error: {0}")]
    Device(String),

    #[error("camera source '{0}' is not available in this build")]
    UnknownSource(String),
}

/// A live video source.
///
/// Dimensions may report `(0, 0)` until the device has negotiated a
/// resolution; callers must skip capture entirely for as long as they do.
pub trait CameraSource: Send + std::fmt::Debug {
    /// Natural dimensions of the source, `(0, 0)` while still negotiating.
    fn dimensions(&self) -> (u32, u32);

    /// Copy the current frame into `buf` as packed RGB24, resizing `buf` to
    /// exactly `width * height * 3`. Returns the frame dimensions.
    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<(u32, u32), CameraError>;
}

/// Acquires camera sources. Acquisition may block on device negotiation and
/// is expected to run off the async runtime.
pub trait CameraProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn CameraSource>, CameraError>;
}

/// Build a provider for the configured camera source.
pub fn provider_for(config: &CameraConfig) -> Result<std::sync::Arc<dyn CameraProvider>, CameraError> {
    match config.source.as_str() {
        "pattern" => Ok(std::sync::Arc::new(PatternProvider::new(
            config.width,
            config.height,
        ))),
        #[cfg(feature = "camera-gstreamer")]
        "gstreamer" => Ok(std::sync::Arc::new(GstProvider::new(config.clone()))),
        other => Err(CameraError::UnknownSource(other.to_string())),
    }
}
