use super::assets::ModelSource;
use super::buffer::InputFrameBuffer;
use super::error::EngineError;
use std::fmt;
use std::str::FromStr;

/// Execution device for the inference engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Device {
    Cpu,
    Cuda { device_id: i32 },
    TensorRt { device_id: i32, fp16: bool },
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Cuda { device_id } => write!(f, "CUDA(device_id={device_id})"),
            Device::TensorRt { device_id, fp16 } => {
                write!(f, "TensorRT(device_id={device_id}, fp16={fp16})")
            }
        }
    }
}

impl FromStr for Device {
    type Err = String;

    /// Accepts `cpu`, `cuda`, `cuda:<id>`, `tensorrt`, `tensorrt:<id>`, `tensorrt-fp16[:<id>]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let (kind, id) = match lower.split_once(':') {
            Some((kind, id)) => {
                let id = id
                    .parse::<i32>()
                    .map_err(|e| format!("invalid device id '{}': {}", id, e))?;
                (kind.to_string(), id)
            }
            None => (lower, 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda { device_id: id }),
            "tensorrt" | "trt" => Ok(Device::TensorRt {
                device_id: id,
                fp16: false,
            }),
            "tensorrt-fp16" | "trt-fp16" => Ok(Device::TensorRt {
                device_id: id,
                fp16: true,
            }),
            other => Err(format!(
                "unknown device '{}', expected cpu, cuda[:id] or tensorrt[:id]",
                other
            )),
        }
    }
}

/// Name and, when statically known, element count of one graph output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub name: String,
    pub element_count: Option<usize>,
}

/// Borrowed view of one output tensor from the last forward pass.
#[derive(Debug, Clone, Copy)]
pub struct RawTensorView<'a> {
    pub shape: &'a [usize],
    pub data: &'a [f32],
}

impl RawTensorView<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Loads network graphs into executable sessions.
pub trait InferenceEngine: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Load a graph into a new session.
    ///
    /// # Arguments
    /// * `graph` - Graph file or bytes
    ///
    /// # Returns
    /// * A session ready to `execute`; dropping it releases the graph
    fn load(&self, graph: &ModelSource) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One loaded graph. Dropping the session releases it.
pub trait EngineSession: Send {
    /// Outputs the graph declares, in graph order.
    fn outputs(&self) -> &[OutputInfo];

    /// Run one forward pass. Returns once the outputs are readable.
    fn execute(&mut self, input: &InputFrameBuffer) -> Result<(), EngineError>;

    /// Output tensor from the most recent `execute`, if the graph produced one by that name.
    fn peek_output(&self, name: &str) -> Option<RawTensorView<'_>>;
}
