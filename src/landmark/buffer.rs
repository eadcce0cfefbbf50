use super::error::{PoseError, Result};
use super::types::{
    Landmark, INPUT_BUFFER_LEN, INPUT_CHANNELS, INPUT_IMAGE_SIZE, SEGMENTATION_SIZE,
};
use image::GrayImage;
use ndarray::{Array2, Array4, ArrayView2, ArrayView4, ArrayViewMut4};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

const INPUT_SHAPE: (usize, usize, usize, usize) = (
    1,
    INPUT_IMAGE_SIZE as usize,
    INPUT_IMAGE_SIZE as usize,
    INPUT_CHANNELS,
);

/// Network input tensor, NHWC `[1, 256, 256, 3]`.
#[derive(Debug, Clone)]
pub struct InputFrameBuffer {
    data: Array4<f32>,
}

impl InputFrameBuffer {
    pub fn new() -> Self {
        Self {
            data: Array4::zeros(INPUT_SHAPE),
        }
    }

    /// Wrap an already normalized tensor, given as a flat NHWC slice.
    ///
    /// # Errors
    /// `InvalidInput` unless `values` holds exactly `INPUT_BUFFER_LEN` floats.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        if values.len() != INPUT_BUFFER_LEN {
            return Err(PoseError::InvalidInput(format!(
                "pre-normalized input has {} values, expected {}",
                values.len(),
                INPUT_BUFFER_LEN
            )));
        }
        let data = Array4::from_shape_vec(INPUT_SHAPE, values.to_vec())
            .map_err(|e| PoseError::InvalidInput(e.to_string()))?;
        Ok(Self { data })
    }

    /// Always `INPUT_BUFFER_LEN`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// NHWC view, `[1, 256, 256, 3]`.
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut4<'_, f32> {
        self.data.view_mut()
    }
}

impl Default for InputFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Landmark output storage, written in place by the decode kernel.
///
/// Each float lives in its own atomic cell so that readers on other threads
/// may observe a partially written frame but never undefined behaviour.
#[derive(Debug)]
pub struct LandmarkBuffer {
    cells: Arc<[AtomicU32]>,
}

impl LandmarkBuffer {
    /// Zeroed buffer holding `records` landmarks.
    pub fn new(records: usize) -> Self {
        let cells = (0..records * 4).map(|_| AtomicU32::new(0)).collect();
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Overwrite one record. Out-of-range indices are ignored.
    pub fn store(&self, index: usize, landmark: Landmark) {
        if let Some(cells) = record_cells(&self.cells, index) {
            for (cell, value) in cells.iter().zip(landmark.to_array()) {
                cell.store(value.to_bits(), Ordering::Relaxed);
            }
        }
    }

    /// Current value of record `index`, or `None` past the end.
    pub fn load(&self, index: usize) -> Option<Landmark> {
        load_record(&self.cells, index)
    }

    /// Read-only handle for collaborators.
    pub fn reader(&self) -> LandmarkReader {
        LandmarkReader {
            cells: Arc::clone(&self.cells),
        }
    }
}

/// Shared read-only view of a [`LandmarkBuffer`].
#[derive(Debug, Clone)]
pub struct LandmarkReader {
    cells: Arc<[AtomicU32]>,
}

impl LandmarkReader {
    pub fn len(&self) -> usize {
        self.cells.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Record `index` as last written. May mix values from two frames.
    pub fn get(&self, index: usize) -> Option<Landmark> {
        load_record(&self.cells, index)
    }

    /// Pose-presence score from the trailing sentinel record.
    pub fn pose_score(&self) -> Option<f32> {
        self.len()
            .checked_sub(1)
            .and_then(|last| self.get(last))
            .map(|sentinel| sentinel.x)
    }

    /// Copy every record, sentinel included.
    pub fn snapshot(&self) -> Vec<Landmark> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

fn record_cells(cells: &[AtomicU32], index: usize) -> Option<&[AtomicU32]> {
    let base = index.checked_mul(4)?;
    cells.get(base..base.checked_add(4)?)
}

fn load_record(cells: &[AtomicU32], index: usize) -> Option<Landmark> {
    let cells = record_cells(cells, index)?;
    let mut values = [0.0f32; 4];
    for (value, cell) in values.iter_mut().zip(cells) {
        *value = f32::from_bits(cell.load(Ordering::Relaxed));
    }
    Some(Landmark::from_array(values))
}

/// Published 128×128 foreground probability mask.
///
/// Cloning yields another handle to the same mask. Updates replace the whole
/// frame under a write lock, so readers never see a half-written mask.
#[derive(Debug, Clone)]
pub struct SegmentationMask {
    pixels: Arc<RwLock<Array2<f32>>>,
}

impl SegmentationMask {
    pub fn new() -> Self {
        Self {
            pixels: Arc::new(RwLock::new(Array2::zeros((
                SEGMENTATION_SIZE,
                SEGMENTATION_SIZE,
            )))),
        }
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        (SEGMENTATION_SIZE as u32, SEGMENTATION_SIZE as u32)
    }

    /// Run `f` against the current frame while holding the read lock.
    pub fn with_pixels<R>(&self, f: impl FnOnce(ArrayView2<'_, f32>) -> R) -> R {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        f(pixels.view())
    }

    pub fn snapshot(&self) -> Array2<f32> {
        self.with_pixels(|pixels| pixels.to_owned())
    }

    /// Grayscale rendering of the mask, 0.0 → black, 1.0 → white.
    pub fn to_gray_image(&self) -> GrayImage {
        self.with_pixels(|pixels| {
            GrayImage::from_fn(SEGMENTATION_SIZE as u32, SEGMENTATION_SIZE as u32, |x, y| {
                let value = pixels[[y as usize, x as usize]];
                image::Luma([(value * 255.0).clamp(0.0, 255.0) as u8])
            })
        })
    }

    /// Replace the published frame with a fully decoded scratch frame.
    pub(crate) fn blit(&self, scratch: &Array2<f32>) {
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        pixels.assign(scratch);
    }
}

impl Default for SegmentationMask {
    fn default() -> Self {
        Self::new()
    }
}
