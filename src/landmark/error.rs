use super::types::ModelVariant;
use thiserror::Error;

/// Failure reported by an inference engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device {0} is not available in this build")]
    UnsupportedDevice(String),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PoseError {
    /// Malformed source frame or pre-normalized buffer. The next frame may succeed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no model graph registered for variant {0}")]
    AssetMissing(ModelVariant),

    #[error("failed to load model graph for variant {variant}")]
    EngineLoadFailure {
        variant: ModelVariant,
        #[source]
        source: EngineError,
    },

    #[error("model graph for variant {variant} has no output named '{output}'")]
    MissingOutput { variant: ModelVariant, output: String },

    #[error(
        "output '{output}' has {actual} elements but the {variant} topology expects {expected}"
    )]
    TopologyMismatch {
        variant: ModelVariant,
        output: String,
        expected: usize,
        actual: usize,
    },

    #[error("inference failed")]
    EngineExecutionFailure(#[source] EngineError),

    #[error("landmarker is unusable for variant {0} after a failed model switch")]
    Unusable(ModelVariant),

    #[error("landmarker has been shut down")]
    ShutDown,
}

impl PoseError {
    /// Only bad per-frame input is worth retrying on the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoseError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, PoseError>;
