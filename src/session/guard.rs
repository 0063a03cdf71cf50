//! RAII ownership of the acquired camera.
//!
//! The guard guarantees the device is released on every exit path of the
//! session, including error paths and drops mid-Acquiring. The capture loop
//! reads through the shared slot, which empties on release, so a released
//! camera can never be read.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::camera::CameraSource;

/// Shared read slot between the guard (owner) and the capture loop (reader).
pub(crate) type SharedCamera = Arc<Mutex<Option<Box<dyn CameraSource>>>>;

pub struct CameraGuard {
    slot: SharedCamera,
}

impl CameraGuard {
    pub fn new(source: Box<dyn CameraSource>) -> Self {
        CameraGuard {
            slot: Arc::new(Mutex::new(Some(source))),
        }
    }

    pub(crate) fn shared(&self) -> SharedCamera {
        Arc::clone(&self.slot)
    }

    /// Stop and release the underlying device. Idempotent: releasing an
    /// already-released guard is a no-op.
    pub fn release(&mut self) {
        if let Some(source) = self.slot.lock().take() {
            drop(source);
            debug!("camera guard released device");
        }
    }

    pub fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.release();
    }
}
