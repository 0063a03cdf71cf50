//! GStreamer-backed camera source (`v4l2src`).
//!
//! Frames are pulled synchronously from an `appsink` as packed RGB, so the
//! capture loop sees the same byte layout as the pattern source.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::debug;

use super::{CameraError, CameraProvider, CameraSource};
use crate::config::CameraConfig;

pub struct GstProvider {
    config: CameraConfig,
}

impl GstProvider {
    pub fn new(config: CameraConfig) -> Self {
        GstProvider { config }
    }
}

impl CameraProvider for GstProvider {
    fn acquire(&self) -> Result<Box<dyn CameraSource>, CameraError> {
        Ok(Box::new(GstCamera::open(&self.config)?))
    }
}

#[derive(Debug)]
pub struct GstCamera {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    // (0, 0) until the first sample arrives with negotiated caps
    width: u32,
    height: u32,
}

impl GstCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        gst::init().map_err(|e| CameraError::Device(e.to_string()))?;

        // Surface an access problem on the device node as PermissionDenied
        // rather than an opaque pipeline state-change failure.
        if let Err(e) = std::fs::File::open(&config.device) {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                return Err(CameraError::PermissionDenied(config.device.clone()));
            }
        }

        let pipe_description = format!(
            "v4l2src device={dev} ! video/x-raw,width={w},height={h},framerate={fps}/1 ! \
             videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink max-buffers=2 drop=true sync=false",
            dev = config.device,
            w = config.width,
            h = config.height,
            fps = config.fps,
        );

        let pipeline = gst::parse::launch(&pipe_description)
            .map_err(|e| CameraError::Device(format!("failed to create pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::Device("parsed element is not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Device("element 'sink' not found".to_string()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::Device("element 'sink' is not an appsink".to_string()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CameraError::Device(format!("failed to start pipeline: {e}")))?;

        debug!(device = %config.device, "gstreamer camera pipeline started");

        Ok(GstCamera {
            pipeline,
            appsink,
            width: 0,
            height: 0,
        })
    }
}

impl CameraSource for GstCamera {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<(u32, u32), CameraError> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(50))
            .ok_or_else(|| CameraError::Device("no sample available".to_string()))?;

        if let Some(caps) = sample.caps() {
            if let Some(s) = caps.structure(0) {
                self.width = s.get::<i32>("width").unwrap_or(0).max(0) as u32;
                self.height = s.get::<i32>("height").unwrap_or(0).max(0) as u32;
            }
        }

        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::Device("sample had no buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CameraError::Device("unable to map buffer".to_string()))?;

        buf.clear();
        buf.extend_from_slice(map.as_slice());
        Ok((self.width, self.height))
    }
}

impl Drop for GstCamera {
    fn drop(&mut self) {
        // Stops the device; failure is not actionable during teardown.
        let _ = self.pipeline.set_state(gst::State::Null);
        debug!("gstreamer camera pipeline stopped");
    }
}
