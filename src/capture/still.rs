use super::CaptureSource;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;

/// Replays one decoded image as an endless stream of identical frames.
pub struct StillImageSource {
    frame: RgbImage,
}

impl StillImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading still image from {}", path.display());

        let frame = image::open(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?
            .to_rgb8();

        Ok(Self::from_image(frame))
    }

    pub fn from_image(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl CaptureSource for StillImageSource {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        Ok(self.frame.clone())
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}
