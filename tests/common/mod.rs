#![allow(dead_code)]

use pose_landmark::landmark::{
    EngineError, EngineSession, InferenceEngine, InputFrameBuffer, ModelAssetSet, ModelSource,
    OutputInfo, OutputNames, RawTensorView,
};
use pose_landmark::ModelVariant;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SEGMENTATION_LEN: usize = 128 * 128;

/// Behaviour of one synthetic graph.
#[derive(Debug, Clone)]
pub struct MockGraph {
    pub landmark_len: usize,
    pub world_len: Option<usize>,
    /// Fixed pose score, or `None` to report the mean of the input tensor.
    pub pose_score: Option<f32>,
    /// Report static element counts from `outputs()`.
    pub declare_shapes: bool,
    pub fail_load: bool,
    pub fail_execute: bool,
}

impl MockGraph {
    pub fn for_variant(variant: ModelVariant) -> Self {
        let topology = variant.topology();
        Self {
            landmark_len: topology.landmark_vector_length,
            world_len: topology.world_landmark_vector_length,
            pose_score: None,
            declare_shapes: true,
            fail_load: false,
            fail_execute: false,
        }
    }
}

/// Raw landmark value the mock emits for `point` (in input pixels).
pub fn raw_landmark(point: usize) -> [f32; 5] {
    let p = point as f32;
    [p * 4.0, 256.0 - p * 2.0, p - 16.0, 0.0, 0.0]
}

/// Raw world value the mock emits for `point` (in metres).
pub fn raw_world_landmark(point: usize) -> [f32; 3] {
    let p = point as f32;
    [p * 0.25, -1.0, 0.5 - p * 0.125]
}

/// Segmentation value the mock emits at row `y`, column `x`.
pub fn raw_segmentation(y: usize, x: usize) -> f32 {
    ((y * 128 + x) % 256) as f32 / 255.0
}

pub fn model_path(variant: ModelVariant) -> PathBuf {
    PathBuf::from(format!("mock/{}.onnx", variant))
}

#[derive(Clone, Default)]
pub struct MockEngine {
    graphs: HashMap<PathBuf, MockGraph>,
    live_sessions: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine knowing correct graphs for every variant.
    pub fn all_variants() -> Self {
        ModelVariant::ALL
            .into_iter()
            .fold(Self::new(), |engine, variant| {
                engine.with_graph(variant, MockGraph::for_variant(variant))
            })
    }

    pub fn with_graph(mut self, variant: ModelVariant, graph: MockGraph) -> Self {
        self.graphs.insert(model_path(variant), graph);
        self
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn load(&self, graph: &ModelSource) -> Result<Box<dyn EngineSession>, EngineError> {
        let ModelSource::File(path) = graph else {
            return Err(EngineError::Backend("mock engine only loads files".to_string()));
        };
        let config = self.graphs.get(path).ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })?;
        if config.fail_load {
            return Err(EngineError::Backend("corrupt graph".to_string()));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession::new(
            config.clone(),
            Arc::clone(&self.live_sessions),
        )))
    }
}

pub struct MockSession {
    graph: MockGraph,
    outputs: Vec<OutputInfo>,
    tensors: HashMap<String, (Vec<usize>, Vec<f32>)>,
    live: Arc<AtomicUsize>,
}

impl MockSession {
    pub fn new(graph: MockGraph, live: Arc<AtomicUsize>) -> Self {
        let names = OutputNames::default();
        let mut declared = vec![
            (names.pose_flag.clone(), 1),
            (names.landmarks.clone(), graph.landmark_len),
            (names.segmentation.clone(), SEGMENTATION_LEN),
        ];
        if let Some(world_len) = graph.world_len {
            declared.push((names.world_landmarks.clone(), world_len));
        }
        let outputs = declared
            .into_iter()
            .map(|(name, count)| OutputInfo {
                name,
                element_count: graph.declare_shapes.then_some(count),
            })
            .collect();

        live.fetch_add(1, Ordering::SeqCst);
        Self {
            graph,
            outputs,
            tensors: HashMap::new(),
            live,
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EngineSession for MockSession {
    fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    fn execute(&mut self, input: &InputFrameBuffer) -> Result<(), EngineError> {
        if self.graph.fail_execute {
            return Err(EngineError::Backend("device lost".to_string()));
        }
        let names = OutputNames::default();

        let score = self
            .graph
            .pose_score
            .unwrap_or_else(|| input.view().mean().unwrap_or(0.0));
        self.tensors
            .insert(names.pose_flag.clone(), (vec![1, 1], vec![score]));

        let landmarks: Vec<f32> = (0..self.graph.landmark_len.div_ceil(5))
            .flat_map(raw_landmark)
            .take(self.graph.landmark_len)
            .collect();
        self.tensors.insert(
            names.landmarks.clone(),
            (vec![1, self.graph.landmark_len], landmarks),
        );

        if let Some(world_len) = self.graph.world_len {
            let world: Vec<f32> = (0..world_len.div_ceil(3))
                .flat_map(raw_world_landmark)
                .take(world_len)
                .collect();
            self.tensors
                .insert(names.world_landmarks.clone(), (vec![1, world_len], world));
        }

        let segmentation: Vec<f32> = (0..128)
            .flat_map(|y| (0..128).map(move |x| raw_segmentation(y, x)))
            .collect();
        self.tensors.insert(
            names.segmentation.clone(),
            (vec![1, 128, 128, 1], segmentation),
        );

        Ok(())
    }

    fn peek_output(&self, name: &str) -> Option<RawTensorView<'_>> {
        self.tensors.get(name).map(|(shape, data)| RawTensorView {
            shape: shape.as_slice(),
            data: data.as_slice(),
        })
    }
}

/// Asset set with a mock graph path registered for each of `variants`.
pub fn assets_for(variants: &[ModelVariant]) -> ModelAssetSet {
    variants
        .iter()
        .fold(ModelAssetSet::new(), |assets, &variant| {
            assets.with_graph(variant, model_path(variant))
        })
}

pub fn test_frame(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}
