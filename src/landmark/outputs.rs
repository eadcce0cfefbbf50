use super::assets::OutputNames;
use super::engine::{EngineSession, OutputInfo};
use super::error::{PoseError, Result};
use super::types::{KeypointTopology, ModelVariant, SEGMENTATION_SIZE};

/// Network outputs the decoder consumes, independent of graph tensor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOutput {
    PoseFlag,
    Landmarks,
    WorldLandmarks,
    Segmentation,
}

impl LogicalOutput {
    pub const ALL: [LogicalOutput; 4] = [
        LogicalOutput::PoseFlag,
        LogicalOutput::Landmarks,
        LogicalOutput::WorldLandmarks,
        LogicalOutput::Segmentation,
    ];

    /// Raw element count for `topology`, or `None` if the topology lacks this output.
    pub fn expected_len(self, topology: &KeypointTopology) -> Option<usize> {
        match self {
            LogicalOutput::PoseFlag => Some(1),
            LogicalOutput::Landmarks => Some(topology.landmark_vector_length),
            LogicalOutput::WorldLandmarks => topology.world_landmark_vector_length,
            LogicalOutput::Segmentation => Some(SEGMENTATION_SIZE * SEGMENTATION_SIZE),
        }
    }

    pub fn tensor_name(self, names: &OutputNames) -> &str {
        match self {
            LogicalOutput::PoseFlag => &names.pose_flag,
            LogicalOutput::Landmarks => &names.landmarks,
            LogicalOutput::WorldLandmarks => &names.world_landmarks,
            LogicalOutput::Segmentation => &names.segmentation,
        }
    }

    // World landmarks are optional even for topologies that define them.
    fn is_required(self) -> bool {
        !matches!(self, LogicalOutput::WorldLandmarks)
    }
}

#[derive(Debug, Clone)]
struct RegisteredOutput {
    logical: LogicalOutput,
    tensor_name: String,
    expected_len: usize,
}

/// Raw tensors for one frame, already checked against the topology.
#[derive(Debug, Clone, Copy)]
pub struct RawOutputs<'a> {
    pub pose_flag: &'a [f32],
    pub landmarks: &'a [f32],
    pub world_landmarks: Option<&'a [f32]>,
    pub segmentation: &'a [f32],
}

/// Mapping from logical outputs to graph tensors, validated when a graph is loaded.
#[derive(Debug, Clone)]
pub struct OutputRegistry {
    variant: ModelVariant,
    entries: Vec<RegisteredOutput>,
}

impl OutputRegistry {
    pub fn resolve(
        variant: ModelVariant,
        names: &OutputNames,
        declared: &[OutputInfo],
    ) -> Result<Self> {
        let topology = variant.topology();
        let mut entries = Vec::with_capacity(LogicalOutput::ALL.len());

        for logical in LogicalOutput::ALL {
            let Some(expected_len) = logical.expected_len(&topology) else {
                continue;
            };
            let tensor_name = logical.tensor_name(names);
            let Some(info) = declared.iter().find(|info| info.name == tensor_name) else {
                if logical.is_required() {
                    return Err(PoseError::MissingOutput {
                        variant,
                        output: tensor_name.to_string(),
                    });
                }
                tracing::debug!("Graph for {} has no '{}' output", variant, tensor_name);
                continue;
            };

            if let Some(actual) = info.element_count {
                if actual != expected_len {
                    return Err(PoseError::TopologyMismatch {
                        variant,
                        output: tensor_name.to_string(),
                        expected: expected_len,
                        actual,
                    });
                }
            }

            entries.push(RegisteredOutput {
                logical,
                tensor_name: tensor_name.to_string(),
                expected_len,
            });
        }

        Ok(Self { variant, entries })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn contains(&self, logical: LogicalOutput) -> bool {
        self.entry(logical).is_some()
    }

    pub fn tensor_name(&self, logical: LogicalOutput) -> Option<&str> {
        self.entry(logical).map(|entry| entry.tensor_name.as_str())
    }

    fn entry(&self, logical: LogicalOutput) -> Option<&RegisteredOutput> {
        self.entries.iter().find(|entry| entry.logical == logical)
    }

    /// Read one output from the session's last forward pass.
    ///
    /// A length that differs from the topology is a `TopologyMismatch`; the
    /// tensor is never truncated or padded.
    pub fn fetch<'s>(
        &self,
        session: &'s dyn EngineSession,
        logical: LogicalOutput,
    ) -> Result<&'s [f32]> {
        let entry = self.entry(logical).ok_or_else(|| PoseError::MissingOutput {
            variant: self.variant,
            output: format!("{:?}", logical),
        })?;

        let tensor = session
            .peek_output(&entry.tensor_name)
            .ok_or_else(|| PoseError::MissingOutput {
                variant: self.variant,
                output: entry.tensor_name.clone(),
            })?;

        if tensor.len() != entry.expected_len {
            tracing::debug!(
                "Output '{}' came back with shape {:?}",
                entry.tensor_name,
                tensor.shape
            );
            return Err(PoseError::TopologyMismatch {
                variant: self.variant,
                output: entry.tensor_name.clone(),
                expected: entry.expected_len,
                actual: tensor.len(),
            });
        }

        Ok(tensor.data)
    }

    /// Fetch every registered output. Nothing is returned unless all of them check out.
    pub fn fetch_all<'s>(&self, session: &'s dyn EngineSession) -> Result<RawOutputs<'s>> {
        let world_landmarks = if self.contains(LogicalOutput::WorldLandmarks) {
            Some(self.fetch(session, LogicalOutput::WorldLandmarks)?)
        } else {
            None
        };

        Ok(RawOutputs {
            pose_flag: self.fetch(session, LogicalOutput::PoseFlag)?,
            landmarks: self.fetch(session, LogicalOutput::Landmarks)?,
            world_landmarks,
            segmentation: self.fetch(session, LogicalOutput::Segmentation)?,
        })
    }
}
