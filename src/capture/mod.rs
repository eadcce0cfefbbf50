mod still;
#[cfg(feature = "camera")]
mod webcam;

pub use still::StillImageSource;
#[cfg(feature = "camera")]
pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Source of frames fed to the landmarker
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
