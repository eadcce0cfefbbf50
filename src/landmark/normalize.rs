use super::buffer::InputFrameBuffer;
use super::error::{PoseError, Result};
use super::types::INPUT_IMAGE_SIZE;
use image::{imageops, RgbImage};

/// Resample-and-convert program producing the network input tensor.
///
/// Implementations must write every element of `output` with NHWC RGB values
/// in `[0, 1]`. `source` is guaranteed non-empty.
pub trait NormalizeKernel: Send + Sync {
    fn dispatch(&self, source: &RgbImage, output: &mut InputFrameBuffer);
}

/// Reference normalize kernel built on `image`'s resampler.
#[derive(Debug, Clone, Copy)]
pub struct ResizeNormalizeKernel {
    filter: imageops::FilterType,
}

impl ResizeNormalizeKernel {
    pub fn with_filter(filter: imageops::FilterType) -> Self {
        Self { filter }
    }
}

impl Default for ResizeNormalizeKernel {
    fn default() -> Self {
        Self::with_filter(imageops::FilterType::Triangle)
    }
}

impl NormalizeKernel for ResizeNormalizeKernel {
    fn dispatch(&self, source: &RgbImage, output: &mut InputFrameBuffer) {
        let resized;
        let image = if source.dimensions() == (INPUT_IMAGE_SIZE, INPUT_IMAGE_SIZE) {
            source
        } else {
            resized = imageops::resize(source, INPUT_IMAGE_SIZE, INPUT_IMAGE_SIZE, self.filter);
            &resized
        };

        let mut tensor = output.view_mut();
        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, y, x, channel]] = pixel[channel] as f32 / 255.0;
            }
        }
    }
}

/// Run the normalize stage for one frame.
pub fn normalize_frame(
    kernel: &dyn NormalizeKernel,
    source: &RgbImage,
    output: &mut InputFrameBuffer,
) -> Result<()> {
    validate_source(source)?;
    let _span = tracing::debug_span!("normalize").entered();
    kernel.dispatch(source, output);
    Ok(())
}

pub(crate) fn validate_source(source: &RgbImage) -> Result<()> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(PoseError::InvalidInput(format!(
            "source image is empty ({}x{})",
            width, height
        )));
    }
    Ok(())
}
