use super::assets::ModelSource;
use super::buffer::InputFrameBuffer;
use super::engine::{Device, EngineSession, InferenceEngine, OutputInfo, RawTensorView};
use super::error::EngineError;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::TensorRef;

/// ONNX Runtime backed inference engine.
pub struct OrtEngine {
    device: Device,
    intra_threads: usize,
}

impl OrtEngine {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            intra_threads: 4,
        }
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    // A requested accelerator that cannot be registered is an error, not a CPU fallback.
    fn register_device(&self, builder: SessionBuilder) -> Result<SessionBuilder, EngineError> {
        match &self.device {
            Device::Cpu => Ok(builder),
            #[cfg(feature = "cuda")]
            Device::Cuda { device_id } => {
                use ort::execution_providers::CUDAExecutionProvider;
                tracing::info!("Registering CUDA execution provider (device {})", device_id);
                let ep = CUDAExecutionProvider::default()
                    .with_device_id(*device_id)
                    .build()
                    .error_on_failure();
                builder
                    .with_execution_providers([ep])
                    .map_err(|e| builder_error("CUDA execution provider", e))
            }
            #[cfg(feature = "tensorrt")]
            Device::TensorRt { device_id, fp16 } => {
                use ort::execution_providers::TensorRTExecutionProvider;
                tracing::info!(
                    "Registering TensorRT execution provider (device {}, fp16={})",
                    device_id,
                    fp16
                );
                let ep = TensorRTExecutionProvider::default()
                    .with_device_id(*device_id)
                    .with_fp16(*fp16)
                    .build()
                    .error_on_failure();
                builder
                    .with_execution_providers([ep])
                    .map_err(|e| builder_error("TensorRT execution provider", e))
            }
            #[allow(unreachable_patterns)]
            other => Err(EngineError::UnsupportedDevice(other.to_string())),
        }
    }
}

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn load(&self, graph: &ModelSource) -> Result<Box<dyn EngineSession>, EngineError> {
        tracing::info!("Loading pose graph from {} on {}", graph, self.device);

        let builder = Session::builder()
            .map_err(|e| builder_error("session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| builder_error("optimization level", e))?
            .with_intra_threads(self.intra_threads)
            .map_err(|e| builder_error("intra-op threads", e))?;
        let builder = self.register_device(builder)?;

        let session = match graph {
            ModelSource::File(path) => builder.commit_from_file(path),
            ModelSource::Memory(bytes) => builder.commit_from_memory(bytes),
        }
        .map_err(|e| builder_error("graph load", e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.to_string())
            .ok_or_else(|| EngineError::Backend("graph declares no inputs".to_string()))?;

        let outputs: Vec<OutputInfo> = session
            .outputs
            .iter()
            .map(|output| OutputInfo {
                name: output.name.to_string(),
                element_count: output
                    .output_type
                    .tensor_shape()
                    .and_then(|shape| static_element_count(shape.iter().copied())),
            })
            .collect();

        tracing::debug!(
            "Graph input '{}', outputs: {:?}",
            input_name,
            outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        );

        let tensors = outputs.iter().map(|_| OwnedTensor::default()).collect();

        Ok(Box::new(OrtSession {
            session,
            input_name,
            outputs,
            tensors,
        }))
    }
}

fn builder_error(stage: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(format!("{}: {}", stage, err))
}

/// Product of the dimensions, or `None` if any dimension is symbolic.
fn static_element_count(dims: impl Iterator<Item = i64>) -> Option<usize> {
    dims.map(|d| usize::try_from(d).ok().filter(|&d| d > 0))
        .try_fold(1usize, |acc, d| d.map(|d| acc * d))
}

#[derive(Debug, Default)]
struct OwnedTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    valid: bool,
}

pub struct OrtSession {
    session: Session,
    input_name: String,
    outputs: Vec<OutputInfo>,
    // Parallel to `outputs`; host copies reused across frames.
    tensors: Vec<OwnedTensor>,
}

impl EngineSession for OrtSession {
    fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    fn execute(&mut self, input: &InputFrameBuffer) -> Result<(), EngineError> {
        let _span = tracing::debug_span!("ort_run").entered();

        for tensor in &mut self.tensors {
            tensor.valid = false;
        }

        let input_tensor = TensorRef::from_array_view(input.view())?;
        let results = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        for (info, tensor) in self.outputs.iter().zip(self.tensors.iter_mut()) {
            let (shape, data) = results[info.name.as_str()].try_extract_tensor::<f32>()?;
            tensor.shape.clear();
            tensor
                .shape
                .extend(shape.iter().map(|&d| usize::try_from(d).unwrap_or(0)));
            tensor.data.clear();
            tensor.data.extend_from_slice(data);
            tensor.valid = true;
        }

        Ok(())
    }

    fn peek_output(&self, name: &str) -> Option<RawTensorView<'_>> {
        let index = self.outputs.iter().position(|o| o.name == name)?;
        let tensor = self.tensors.get(index).filter(|t| t.valid)?;
        Some(RawTensorView {
            shape: &tensor.shape,
            data: &tensor.data,
        })
    }
}
