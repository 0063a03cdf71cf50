//! Session lifecycle.
//!
//! A session is one real-time detection run: camera acquisition through
//! channel teardown. The controller is the only component with external
//! start/stop entry points and owns all per-session resources (the camera
//! guard, the channel, and the capture/render tasks). The `epoch` counter
//! distinguishes one run from the next: any continuation created by a
//! superseded run re-checks it before touching shared state, which is the
//! guard against the use-after-stop bug class.

mod guard;

pub use guard::CameraGuard;
pub(crate) use guard::SharedCamera;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::camera::{CameraError, CameraProvider};
use crate::capture;
use crate::render::{self, SharedSurface};
use crate::transport::{Channel, ChannelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Acquiring,
    Active,
    Stopping,
    Failed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Connection(#[from] ChannelError),
}

/// Tunables for one streaming run.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub endpoint: Url,
    pub interval: Duration,
    pub jpeg_quality: u8,
}

struct Inner {
    status: SessionStatus,
    epoch: u64,
    camera: Option<CameraGuard>,
    channel: Option<Channel>,
    capture_task: Option<JoinHandle<()>>,
    render_task: Option<JoinHandle<()>>,
}

pub struct SessionController {
    settings: StreamSettings,
    provider: Arc<dyn CameraProvider>,
    surface: SharedSurface,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(
        settings: StreamSettings,
        provider: Arc<dyn CameraProvider>,
        surface: SharedSurface,
    ) -> Self {
        SessionController {
            settings,
            provider,
            surface,
            inner: Arc::new(Mutex::new(Inner {
                status: SessionStatus::Idle,
                epoch: 0,
                camera: None,
                channel: None,
                capture_task: None,
                render_task: None,
            })),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Begin a streaming run. No-op when the session is not Idle. The camera
    /// and the channel are requested concurrently; on both succeeding the
    /// capture loop is armed and the session becomes Active. On either
    /// failing, whichever partial resource was acquired is released before
    /// the error is surfaced; no dangling camera or open socket remains.
    pub async fn start(&self) -> Result<(), SessionError> {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.status != SessionStatus::Idle {
                debug!(status = ?inner.status, "start ignored, session not idle");
                return Ok(());
            }
            inner.epoch += 1;
            inner.status = SessionStatus::Acquiring;
            inner.epoch
        };
        info!(epoch, endpoint = %self.settings.endpoint, "session acquiring");

        let provider = Arc::clone(&self.provider);
        let camera_task = tokio::task::spawn_blocking(move || provider.acquire());
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (camera_res, channel_res) = tokio::join!(
            camera_task,
            Channel::connect(&self.settings.endpoint, inbound_tx)
        );

        let camera_res = match camera_res {
            Ok(res) => res,
            Err(e) => Err(CameraError::Device(format!(
                "camera acquisition task failed: {e}"
            ))),
        };

        match (camera_res, channel_res) {
            (Ok(source), Ok(channel)) => {
                let mut inner = self.inner.lock();
                if inner.epoch != epoch || inner.status != SessionStatus::Acquiring {
                    // Superseded while acquiring (stop, or stop + newer
                    // start). This continuation owns its resources and must
                    // release them itself; the session state is not ours.
                    drop(inner);
                    channel.close();
                    drop(source);
                    debug!(epoch, "acquisition superseded, resources released");
                    return Ok(());
                }

                let camera = CameraGuard::new(source);
                let capture_task = tokio::spawn(capture::run_capture_loop(
                    camera.shared(),
                    channel.sender(),
                    self.settings.interval,
                    self.settings.jpeg_quality,
                ));
                let render_task = tokio::spawn(render::run_renderer(
                    Arc::clone(&self.surface),
                    inbound_rx,
                ));

                inner.camera = Some(camera);
                inner.channel = Some(channel);
                inner.capture_task = Some(capture_task);
                inner.render_task = Some(render_task);
                inner.status = SessionStatus::Active;
                info!(epoch, "session active");
                Ok(())
            }
            (Ok(source), Err(e)) => {
                drop(source);
                debug!(epoch, "camera released after channel failure");
                self.fail(epoch);
                Err(e.into())
            }
            (Err(e), Ok(channel)) => {
                channel.close();
                debug!(epoch, "channel closed after camera failure");
                self.fail(epoch);
                Err(e.into())
            }
            (Err(e), Err(channel_err)) => {
                debug!(epoch, error = %channel_err, "channel connect also failed");
                self.fail(epoch);
                Err(e.into())
            }
        }
    }

    /// End the run. No-op when Idle; otherwise cancels the capture task,
    /// closes the channel, and releases the camera, synchronously under the
    /// state lock, before returning to Idle. Idempotent, safe from any
    /// non-Idle state including error paths.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.status == SessionStatus::Idle {
            return;
        }
        let epoch = inner.epoch;
        inner.status = SessionStatus::Stopping;

        if let Some(task) = inner.capture_task.take() {
            task.abort();
        }
        if let Some(channel) = inner.channel.take() {
            channel.close();
        }
        if let Some(mut camera) = inner.camera.take() {
            camera.release();
        }
        if let Some(task) = inner.render_task.take() {
            task.abort();
        }

        inner.status = SessionStatus::Idle;
        info!(epoch, "session stopped");
    }

    /// The single external control action: stop when running, start when
    /// Idle.
    pub async fn toggle(&self) -> Result<(), SessionError> {
        if self.status() == SessionStatus::Idle {
            self.start().await
        } else {
            self.stop();
            Ok(())
        }
    }

    /// Record a failed acquisition. The failure is recoverable: the session
    /// passes through Failed and lands on Idle, ready for the next start.
    fn fail(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.status != SessionStatus::Acquiring {
            return;
        }
        inner.status = SessionStatus::Failed;
        warn!(epoch, "session failed during acquisition");
        inner.status = SessionStatus::Idle;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PatternProvider;
    use crate::render::DiscardSurface;
    use assert_matches::assert_matches;

    fn unreachable_endpoint() -> Url {
        // Port 1 refuses connections on any sane test host.
        Url::parse("ws://127.0.0.1:1/").unwrap()
    }

    fn controller_with(provider: PatternProvider) -> (SessionController, Arc<crate::camera::PatternStats>) {
        let stats = provider.stats();
        let controller = SessionController::new(
            StreamSettings {
                endpoint: unreachable_endpoint(),
                interval: Duration::from_millis(100),
                jpeg_quality: 80,
            },
            Arc::new(provider),
            render::shared(Box::new(DiscardSurface::new())),
        );
        (controller, stats)
    }

    #[tokio::test]
    async fn test_stop_from_idle_is_noop() {
        let (controller, stats) = controller_with(PatternProvider::new(32, 32));
        controller.stop();
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(controller.epoch(), 0);
        assert_eq!(stats.acquired(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_releases_acquired_camera() {
        let (controller, stats) = controller_with(PatternProvider::new(32, 32));

        let result = controller.start().await;
        assert_matches!(result, Err(SessionError::Connection(_)));
        assert_eq!(controller.status(), SessionStatus::Idle);
        // acquired once, released exactly once, nothing live
        assert_eq!(stats.acquired(), 1);
        assert_eq!(stats.released(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_and_returns_to_idle() {
        let provider = PatternProvider::new(32, 32);
        provider.set_deny(true);
        let (controller, stats) = controller_with(provider);

        let result = controller.start().await;
        assert_matches!(
            result,
            Err(SessionError::Camera(CameraError::PermissionDenied(_)))
        );
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(stats.acquired(), 0);
    }

    #[tokio::test]
    async fn test_epoch_increments_per_start() {
        let (controller, _stats) = controller_with(PatternProvider::new(32, 32));
        let _ = controller.start().await;
        let _ = controller.start().await;
        assert_eq!(controller.epoch(), 2);
    }
}
