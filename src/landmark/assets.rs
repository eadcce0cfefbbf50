use super::decode::{DecodeKernel, LandmarkDecodeKernel};
use super::normalize::{NormalizeKernel, ResizeNormalizeKernel};
use super::types::ModelVariant;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Where a network graph comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::File(path)
    }
}

impl From<&str> for ModelSource {
    fn from(path: &str) -> Self {
        ModelSource::File(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModelSource::Memory(bytes)
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::File(path) => write!(f, "{}", path.display()),
            ModelSource::Memory(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

/// Tensor names a graph uses for each logical output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub pose_flag: String,
    pub landmarks: String,
    pub world_landmarks: String,
    pub segmentation: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            pose_flag: "output_poseflag".to_string(),
            landmarks: "ld_3d".to_string(),
            world_landmarks: "world_3d".to_string(),
            segmentation: "output_segmentation".to_string(),
        }
    }
}

/// One network graph together with the tensor names it uses.
#[derive(Debug, Clone)]
pub struct GraphAsset {
    pub source: ModelSource,
    pub outputs: OutputNames,
}

impl GraphAsset {
    /// Graph using the default output names.
    pub fn new(source: impl Into<ModelSource>) -> Self {
        Self {
            source: source.into(),
            outputs: OutputNames::default(),
        }
    }

    /// Override the tensor names, for graphs exported with different ones.
    pub fn with_outputs(mut self, outputs: OutputNames) -> Self {
        self.outputs = outputs;
        self
    }
}

/// Graphs for each supported variant plus the normalize and decode kernels.
///
/// Built once by the caller and borrowed by a `Landmarker` for its lifetime.
pub struct ModelAssetSet {
    graphs: HashMap<ModelVariant, GraphAsset>,
    normalize: Box<dyn NormalizeKernel>,
    decode: Box<dyn DecodeKernel>,
}

impl ModelAssetSet {
    /// Empty set using the reference kernels.
    pub fn new() -> Self {
        Self {
            graphs: HashMap::new(),
            normalize: Box::new(ResizeNormalizeKernel::default()),
            decode: Box::new(LandmarkDecodeKernel),
        }
    }

    /// Register the graph for `variant` with the default output names.
    ///
    /// # Arguments
    /// * `variant` - Variant the graph implements
    /// * `source` - ONNX file path or in-memory bytes
    pub fn with_graph(self, variant: ModelVariant, source: impl Into<ModelSource>) -> Self {
        self.with_graph_asset(variant, GraphAsset::new(source))
    }

    /// Register a fully described graph for `variant`, replacing any previous one.
    pub fn with_graph_asset(mut self, variant: ModelVariant, asset: GraphAsset) -> Self {
        self.graphs.insert(variant, asset);
        self
    }

    /// Replace the reference normalize kernel.
    pub fn with_normalize_kernel(mut self, kernel: impl NormalizeKernel + 'static) -> Self {
        self.normalize = Box::new(kernel);
        self
    }

    /// Replace the reference decode kernel.
    pub fn with_decode_kernel(mut self, kernel: impl DecodeKernel + 'static) -> Self {
        self.decode = Box::new(kernel);
        self
    }

    /// Graph registered for `variant`, if any.
    pub fn graph(&self, variant: ModelVariant) -> Option<&GraphAsset> {
        self.graphs.get(&variant)
    }

    /// Variants with a registered graph, in `ModelVariant::ALL` order.
    pub fn variants(&self) -> Vec<ModelVariant> {
        ModelVariant::ALL
            .into_iter()
            .filter(|variant| self.graphs.contains_key(variant))
            .collect()
    }

    /// Kernel used by the normalize stage.
    pub fn normalize_kernel(&self) -> &dyn NormalizeKernel {
        self.normalize.as_ref()
    }

    /// Kernel used by the decode stage.
    pub fn decode_kernel(&self) -> &dyn DecodeKernel {
        self.decode.as_ref()
    }
}

impl Default for ModelAssetSet {
    fn default() -> Self {
        Self::new()
    }
}
