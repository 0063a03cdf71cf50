//! Streaming client for a remote object and lane detection service.
//!
//! Two paths to the service:
//! - a real-time session: camera frames are JPEG/base64-encoded and shipped
//!   over a persistent WebSocket on a fixed 100 ms cadence; annotated frames
//!   come back on the same connection and are rendered as they arrive
//! - a one-shot batch upload: POST a video file, receive a downloadable
//!   annotated result
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lanewatch::camera::PatternProvider;
//! use lanewatch::render::{self, DiscardSurface};
//! use lanewatch::session::{SessionController, StreamSettings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let controller = SessionController::new(
//!     StreamSettings {
//!         endpoint: url::Url::parse("ws://127.0.0.1:5000/")?,
//!         interval: Duration::from_millis(100),
//!         jpeg_quality: 80,
//!     },
//!     Arc::new(PatternProvider::new(640, 480)),
//!     render::shared(Box::new(DiscardSurface::new())),
//! );
//! controller.toggle().await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod camera;
pub mod capture;
pub mod config;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use batch::{BatchClient, UploadError};
pub use camera::{CameraError, CameraProvider, CameraSource};
pub use config::Config;
pub use protocol::ClientMessage;
pub use render::{DiscardSurface, FileSurface, RenderSurface};
pub use session::{SessionController, SessionError, SessionStatus, StreamSettings};
pub use transport::{Channel, ChannelError, ChannelState};
