//! Wire contract with the detection service.
//!
//! Outbound messages are JSON objects tagged with a `type` field. Inbound
//! annotated frames arrive as the bare base64 JPEG string with no wrapper.
//! That asymmetry with the outbound shape is deliberate: the deployed
//! service emits the payload directly and keys processing by connection
//! identity.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One captured camera frame, JPEG bytes base64-encoded for transport.
    VideoFrame { image: String },
}

/// A decoded annotated frame as returned by the service.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: image::RgbImage,
}

#[derive(Error, Debug)]
pub enum FrameCodecError {
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a decodable image: {0}")]
    Decode(image::ImageError),
}

/// Encode a packed RGB24 buffer as base64'd JPEG for transport.
pub fn encode_frame(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<String, FrameCodecError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
        rgb,
        width,
        height,
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(BASE64.encode(jpeg))
}

/// Decode an inbound base64'd JPEG payload.
pub fn decode_frame(payload: &str) -> Result<DecodedFrame, FrameCodecError> {
    let bytes = BASE64.decode(payload.trim())?;
    let image = image::load_from_memory(&bytes).map_err(FrameCodecError::Decode)?;
    let pixels = image.to_rgb8();
    let (width, height) = (pixels.width(), pixels.height());
    Ok(DecodedFrame {
        width,
        height,
        pixels,
    })
}
