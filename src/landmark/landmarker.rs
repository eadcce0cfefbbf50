use super::assets::ModelAssetSet;
use super::buffer::{InputFrameBuffer, LandmarkBuffer, LandmarkReader, SegmentationMask};
use super::decode::OutputDecoder;
use super::engine::{Device, EngineSession, InferenceEngine};
use super::error::{PoseError, Result};
use super::normalize::{normalize_frame, validate_source};
use super::onnx::OrtEngine;
use super::outputs::{LogicalOutput, OutputRegistry};
use super::types::{KeypointTopology, ModelVariant};
use image::RgbImage;

/// Everything that depends on the active variant's topology.
///
/// Built completely before it is published, so the engine, registry and
/// buffers always agree on the topology.
struct ActiveModel {
    variant: ModelVariant,
    topology: KeypointTopology,
    session: Box<dyn EngineSession>,
    registry: OutputRegistry,
    landmarks: LandmarkBuffer,
    world_landmarks: Option<LandmarkBuffer>,
}

impl ActiveModel {
    fn load(
        assets: &ModelAssetSet,
        engine: &dyn InferenceEngine,
        variant: ModelVariant,
    ) -> Result<Self> {
        let graph = assets
            .graph(variant)
            .ok_or(PoseError::AssetMissing(variant))?;
        let topology = variant.topology();

        let session = engine
            .load(&graph.source)
            .map_err(|source| PoseError::EngineLoadFailure { variant, source })?;
        let registry = OutputRegistry::resolve(variant, &graph.outputs, session.outputs())?;

        let landmarks = LandmarkBuffer::new(topology.record_count());
        let world_landmarks = registry
            .contains(LogicalOutput::WorldLandmarks)
            .then(|| LandmarkBuffer::new(topology.record_count()));

        Ok(Self {
            variant,
            topology,
            session,
            registry,
            landmarks,
            world_landmarks,
        })
    }

    // Engine instance first, then the buffers it wrote into.
    fn release(self) {
        let ActiveModel {
            variant,
            session,
            landmarks,
            world_landmarks,
            ..
        } = self;
        drop(session);
        drop(landmarks);
        drop(world_landmarks);
        tracing::debug!("Released {} model", variant);
    }
}

enum State {
    Active(ActiveModel),
    /// The last switch to this variant failed; nothing is loaded.
    Failed(ModelVariant),
    Released,
}

/// Single-subject pose landmark pipeline.
///
/// Each `process_*` call runs normalize → inference → decode → mask blit and
/// returns once the outputs are readable through the handles returned by
/// [`output_buffer`](Self::output_buffer) and friends. Changing the requested
/// variant between calls hot-swaps the model before the frame is touched.
pub struct Landmarker<'a> {
    assets: &'a ModelAssetSet,
    engine: Box<dyn InferenceEngine + 'a>,
    input: Option<InputFrameBuffer>,
    mask: Option<SegmentationMask>,
    decoder: OutputDecoder,
    state: State,
}

impl<'a> Landmarker<'a> {
    /// Allocate the input buffer and mask, then load `initial`.
    ///
    /// Fails if `assets` has no graph for `initial`; there is no fallback variant.
    pub fn new(
        assets: &'a ModelAssetSet,
        engine: Box<dyn InferenceEngine + 'a>,
        initial: ModelVariant,
    ) -> Result<Self> {
        tracing::info!(
            "Initializing landmarker with {} engine, variant {}",
            engine.name(),
            initial
        );

        let input = InputFrameBuffer::new();
        let mask = SegmentationMask::new();
        let model = {
            let _span = tracing::info_span!("switch_variant", variant = %initial).entered();
            ActiveModel::load(assets, engine.as_ref(), initial)?
        };
        tracing::info!(
            "Active model variant: {} ({} keypoints)",
            initial,
            model.topology.vertex_count
        );

        Ok(Self {
            assets,
            engine,
            input: Some(input),
            mask: Some(mask),
            decoder: OutputDecoder::new(),
            state: State::Active(model),
        })
    }

    /// Landmarker running graphs through ONNX Runtime on `device`.
    pub fn with_onnx(
        assets: &'a ModelAssetSet,
        device: Device,
        initial: ModelVariant,
    ) -> Result<Self> {
        Self::new(assets, Box::new(OrtEngine::new(device)), initial)
    }

    /// Load `variant` and publish it as the active model.
    ///
    /// On failure the previous model is released as well and the landmarker
    /// stays unusable for `variant` until a different variant is requested.
    pub fn switch_variant(&mut self, variant: ModelVariant) -> Result<()> {
        if matches!(self.state, State::Released) {
            return Err(PoseError::ShutDown);
        }
        let _span = tracing::info_span!("switch_variant", variant = %variant).entered();

        match ActiveModel::load(self.assets, self.engine.as_ref(), variant) {
            Ok(model) => {
                let vertex_count = model.topology.vertex_count;
                let previous = std::mem::replace(&mut self.state, State::Active(model));
                if let State::Active(old) = previous {
                    tracing::debug!("Retiring {} model", old.variant);
                    old.release();
                }
                tracing::info!("Active model variant: {} ({} keypoints)", variant, vertex_count);
                Ok(())
            }
            Err(err) => {
                tracing::error!("Switch to {} failed: {}", variant, err);
                let previous = std::mem::replace(&mut self.state, State::Failed(variant));
                if let State::Active(old) = previous {
                    old.release();
                }
                Err(err)
            }
        }
    }

    /// Run the full pipeline on `frame` with the `variant` model.
    ///
    /// # Arguments
    /// * `frame` - RGB frame of any non-zero resolution
    /// * `variant` - Model to run; switched to first if it is not the active one
    ///
    /// # Errors
    /// `InvalidInput` for an empty frame (the active model is left alone).
    /// Switch failures and engine or topology errors are fatal for the frame.
    pub fn process_image(&mut self, frame: &RgbImage, variant: ModelVariant) -> Result<()> {
        validate_source(frame)?;
        self.ensure_variant(variant)?;

        let input = self.input.as_mut().ok_or(PoseError::ShutDown)?;
        normalize_frame(self.assets.normalize_kernel(), frame, input)?;
        self.run(None)
    }

    /// Run inference and decode on an input tensor that is already network-shaped.
    pub fn process_normalized(
        &mut self,
        input: &InputFrameBuffer,
        variant: ModelVariant,
    ) -> Result<()> {
        self.ensure_variant(variant)?;
        self.run(Some(input))
    }

    fn ensure_variant(&mut self, variant: ModelVariant) -> Result<()> {
        match self.state {
            State::Released => return Err(PoseError::ShutDown),
            State::Active(ref model) if model.variant == variant => return Ok(()),
            State::Failed(failed) if failed == variant => {
                return Err(PoseError::Unusable(variant))
            }
            _ => {}
        }
        self.switch_variant(variant)
    }

    fn run(&mut self, external_input: Option<&InputFrameBuffer>) -> Result<()> {
        let Self {
            assets,
            input,
            mask,
            decoder,
            state,
            ..
        } = self;

        let model = match state {
            State::Active(model) => model,
            State::Failed(variant) => return Err(PoseError::Unusable(*variant)),
            State::Released => return Err(PoseError::ShutDown),
        };
        let input = match external_input {
            Some(buffer) => buffer,
            None => input.as_ref().ok_or(PoseError::ShutDown)?,
        };
        let mask = mask.as_ref().ok_or(PoseError::ShutDown)?;

        {
            let _span = tracing::debug_span!("inference", variant = %model.variant).entered();
            model
                .session
                .execute(input)
                .map_err(PoseError::EngineExecutionFailure)?;
        }

        decoder.decode(
            assets.decode_kernel(),
            &model.topology,
            &model.registry,
            model.session.as_ref(),
            &model.landmarks,
            model.world_landmarks.as_ref(),
            mask,
        )
    }

    /// Release engine, input buffer, output buffers and mask, in that order.
    ///
    /// Safe to call repeatedly. Handles already given out stay readable but
    /// are no longer updated.
    pub fn shutdown(&mut self) {
        let (session, landmarks, world_landmarks) =
            match std::mem::replace(&mut self.state, State::Released) {
                State::Released => return,
                State::Active(model) => (
                    Some(model.session),
                    Some(model.landmarks),
                    model.world_landmarks,
                ),
                State::Failed(_) => (None, None, None),
            };

        drop(session);
        self.input = None;
        drop(landmarks);
        drop(world_landmarks);
        self.mask = None;

        tracing::info!("Landmarker shut down");
    }

    /// Name of the inference engine backing this landmarker (e.g. "onnxruntime").
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    fn active(&self) -> Option<&ActiveModel> {
        match &self.state {
            State::Active(model) => Some(model),
            _ => None,
        }
    }

    /// Whether a model is loaded and frames can be processed.
    ///
    /// False after a failed switch or after `shutdown`.
    pub fn is_usable(&self) -> bool {
        self.active().is_some()
    }

    /// Variant of the currently loaded model, if any.
    pub fn active_variant(&self) -> Option<ModelVariant> {
        self.active().map(|model| model.variant)
    }

    /// Output topology of the currently loaded model, if any.
    pub fn topology(&self) -> Option<KeypointTopology> {
        self.active().map(|model| model.topology)
    }

    /// Joint count of the active topology (25 or 33).
    pub fn vertex_count(&self) -> Option<usize> {
        self.active().map(|model| model.topology.vertex_count)
    }

    /// `vertex_count + 1` records: joints followed by the pose-score sentinel.
    pub fn output_buffer(&self) -> Option<LandmarkReader> {
        self.active().map(|model| model.landmarks.reader())
    }

    /// Metric world coordinates, for graphs that provide them.
    pub fn world_landmark_buffer(&self) -> Option<LandmarkReader> {
        self.active()
            .and_then(|model| model.world_landmarks.as_ref())
            .map(LandmarkBuffer::reader)
    }

    /// Handle to the 128×128 foreground mask.
    ///
    /// The mask survives variant switches; it is only released by `shutdown`.
    pub fn segmentation_mask(&self) -> Option<SegmentationMask> {
        self.mask.clone()
    }
}

impl Drop for Landmarker<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
