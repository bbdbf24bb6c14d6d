use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// One uncompressed RGB8 frame from the camera.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// The camera. Grabbing must be quick; it runs on the tick that asked for it.
pub trait FrameSource: Send + Sync {
    fn grab(&self) -> Result<RawFrame>;
}

/// A still image ready for upload, as a JPEG data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data_url: String,
}

impl EncodedFrame {
    pub fn as_data_url(&self) -> &str {
        &self.data_url
    }

    pub fn into_data_url(self) -> String {
        self.data_url
    }

    /// Decodes the JPEG bytes back out of the data URL.
    pub fn jpeg_bytes(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .data_url
            .split_once(',')
            .ok_or_else(|| anyhow!("frame is not a data URL"))?;
        STANDARD
            .decode(payload)
            .context("frame payload is not valid base64")
    }
}

pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<EncodedFrame> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(|| {
        anyhow!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.rgb.len(),
            frame.width,
            frame.height
        )
    })?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&image)
        .context("jpeg encoding failed")?;

    Ok(EncodedFrame {
        data_url: format!("{DATA_URL_PREFIX}{}", STANDARD.encode(&jpeg)),
    })
}

/// Grabs and encodes a still of the current feed on demand.
#[derive(Clone)]
pub struct FrameCapture {
    source: Arc<dyn FrameSource>,
    quality: u8,
}

impl FrameCapture {
    pub fn new(source: Arc<dyn FrameSource>, quality: u8) -> Self {
        Self {
            source,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn capture(&self) -> Result<EncodedFrame> {
        let frame = self.source.grab().context("camera grab failed")?;
        encode_jpeg(&frame, self.quality)
    }
}
