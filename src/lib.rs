//! Single-subject body pose landmarks with segmentation, driven by ONNX
//! pose-landmark networks and hot-swappable between model variants.

pub mod capture;
pub mod landmark;

pub use landmark::{
    Device, InputFrameBuffer, KeypointTopology, Landmark, LandmarkReader, Landmarker,
    ModelAssetSet, ModelSource, ModelVariant, PoseError, PoseJoint, SegmentationMask,
};
