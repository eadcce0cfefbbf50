mod assets;
mod buffer;
mod decode;
mod engine;
mod error;
mod landmarker;
mod normalize;
mod onnx;
mod outputs;
pub mod types;

pub use assets::{GraphAsset, ModelAssetSet, ModelSource, OutputNames};
pub use buffer::{InputFrameBuffer, LandmarkBuffer, LandmarkReader, SegmentationMask};
pub use decode::{DecodeKernel, LandmarkDecodeKernel, OutputDecoder};
pub use engine::{Device, EngineSession, InferenceEngine, OutputInfo, RawTensorView};
pub use error::{EngineError, PoseError, Result};
pub use landmarker::Landmarker;
pub use normalize::{normalize_frame, NormalizeKernel, ResizeNormalizeKernel};
pub use onnx::{OrtEngine, OrtSession};
pub use outputs::{LogicalOutput, OutputRegistry, RawOutputs};
pub use types::{KeypointTopology, Landmark, ModelVariant, PoseJoint};
