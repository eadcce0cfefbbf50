use super::buffer::{LandmarkBuffer, SegmentationMask};
use super::engine::EngineSession;
use super::error::Result;
use super::outputs::{OutputRegistry, RawOutputs};
use super::types::{
    KeypointTopology, Landmark, INPUT_IMAGE_SIZE, LANDMARK_STRIDE, SEGMENTATION_SIZE,
    WORLD_LANDMARK_STRIDE,
};
use ndarray::Array2;

/// Fixed-function program assembling the public landmark records.
///
/// For a topology with `vertex_count` joints it must write records
/// `0..vertex_count` in joint-index order and the sentinel
/// `(pose_score, 0, 0, 0)` at index `vertex_count`, into `landmarks` and, when
/// given, `world_landmarks`. Raw slices have already been length-checked.
pub trait DecodeKernel: Send + Sync {
    fn dispatch(
        &self,
        topology: &KeypointTopology,
        raw: &RawOutputs<'_>,
        landmarks: &LandmarkBuffer,
        world_landmarks: Option<&LandmarkBuffer>,
    );
}

/// Reference decode kernel.
///
/// Image-space coordinates arrive in input pixels and are scaled to `[0, 1]`;
/// visibility arrives as a logit. z is zero-filled for topologies without depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkDecodeKernel;

impl DecodeKernel for LandmarkDecodeKernel {
    fn dispatch(
        &self,
        topology: &KeypointTopology,
        raw: &RawOutputs<'_>,
        landmarks: &LandmarkBuffer,
        world_landmarks: Option<&LandmarkBuffer>,
    ) {
        let scale = 1.0 / INPUT_IMAGE_SIZE as f32;
        let pose_score = raw
            .pose_flag
            .first()
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let points = raw
            .landmarks
            .chunks_exact(LANDMARK_STRIDE)
            .take(topology.vertex_count);
        for (index, point) in points.enumerate() {
            let z = if topology.has_depth { point[2] * scale } else { 0.0 };
            landmarks.store(
                index,
                Landmark::new(point[0] * scale, point[1] * scale, z, sigmoid(point[3])),
            );
        }
        landmarks.store(topology.sentinel_index(), Landmark::sentinel(pose_score));

        if let (Some(world), Some(raw_world)) = (world_landmarks, raw.world_landmarks) {
            let points = raw_world
                .chunks_exact(WORLD_LANDMARK_STRIDE)
                .zip(raw.landmarks.chunks_exact(LANDMARK_STRIDE))
                .take(topology.vertex_count);
            for (index, (point, image_point)) in points.enumerate() {
                world.store(
                    index,
                    Landmark::new(point[0], point[1], point[2], sigmoid(image_point[3])),
                );
            }
            world.store(topology.sentinel_index(), Landmark::sentinel(pose_score));
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode stage: reads the registered outputs, dispatches the decode kernel,
/// and publishes the segmentation mask through a private scratch frame.
#[derive(Debug)]
pub struct OutputDecoder {
    scratch: Array2<f32>,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self {
            scratch: Array2::zeros((SEGMENTATION_SIZE, SEGMENTATION_SIZE)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn decode(
        &mut self,
        kernel: &dyn DecodeKernel,
        topology: &KeypointTopology,
        registry: &OutputRegistry,
        session: &dyn EngineSession,
        landmarks: &LandmarkBuffer,
        world_landmarks: Option<&LandmarkBuffer>,
        mask: &SegmentationMask,
    ) -> Result<()> {
        // Every tensor is checked before any output is touched.
        let raw = registry.fetch_all(session)?;

        let _span = tracing::debug_span!("decode", vertex_count = topology.vertex_count).entered();
        kernel.dispatch(topology, &raw, landmarks, world_landmarks);

        for (dst, &src) in self.scratch.iter_mut().zip(raw.segmentation) {
            *dst = src;
        }
        mask.blit(&self.scratch);

        Ok(())
    }
}

impl Default for OutputDecoder {
    fn default() -> Self {
        Self::new()
    }
}
