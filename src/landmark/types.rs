use std::fmt;
use std::str::FromStr;

/// Side length of the square network input image.
pub const INPUT_IMAGE_SIZE: u32 = 256;

/// Channels in the network input (RGB).
pub const INPUT_CHANNELS: usize = 3;

/// Number of floats in the network input buffer (1×256×256×3).
pub const INPUT_BUFFER_LEN: usize =
    INPUT_IMAGE_SIZE as usize * INPUT_IMAGE_SIZE as usize * INPUT_CHANNELS;

/// Side length of the square segmentation mask.
pub const SEGMENTATION_SIZE: usize = 128;

/// Floats per point in the raw landmark vector: x, y, z, visibility, presence.
pub const LANDMARK_STRIDE: usize = 5;

/// Floats per point in the raw world-landmark vector: x, y, z.
pub const WORLD_LANDMARK_STRIDE: usize = 3;

pub const UPPER_BODY_VERTEX_COUNT: usize = 25;
pub const FULL_BODY_VERTEX_COUNT: usize = 33;
pub const UPPER_BODY_LANDMARK_LEN: usize = 155;
pub const FULL_BODY_LANDMARK_LEN: usize = 195;
pub const FULL_BODY_WORLD_LANDMARK_LEN: usize = 117;

/// Shape of the network outputs for one family of models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeypointTopology {
    /// Number of joints written to the output buffer.
    pub vertex_count: usize,
    /// Length of the raw landmark vector emitted by the network.
    pub landmark_vector_length: usize,
    /// Length of the raw world-landmark vector, if the topology has one.
    pub world_landmark_vector_length: Option<usize>,
    /// Whether the z channel carries relative depth.
    pub has_depth: bool,
}

impl KeypointTopology {
    pub const UPPER_BODY: KeypointTopology = KeypointTopology {
        vertex_count: UPPER_BODY_VERTEX_COUNT,
        landmark_vector_length: UPPER_BODY_LANDMARK_LEN,
        world_landmark_vector_length: None,
        has_depth: false,
    };

    pub const FULL_BODY: KeypointTopology = KeypointTopology {
        vertex_count: FULL_BODY_VERTEX_COUNT,
        landmark_vector_length: FULL_BODY_LANDMARK_LEN,
        world_landmark_vector_length: Some(FULL_BODY_WORLD_LANDMARK_LEN),
        has_depth: true,
    };

    /// Records in the output buffer: one per joint plus the sentinel.
    pub fn record_count(&self) -> usize {
        self.vertex_count + 1
    }

    /// Index of the sentinel record carrying the pose-presence score.
    pub fn sentinel_index(&self) -> usize {
        self.vertex_count
    }

    pub fn has_world_landmarks(&self) -> bool {
        self.world_landmark_vector_length.is_some()
    }

    /// Joints covered by this topology, in output-buffer order.
    pub fn joints(&self) -> &'static [PoseJoint] {
        &PoseJoint::ALL[..self.vertex_count]
    }
}

/// Selectable pose network.
///
/// `Lite` and `Full` share the 33-point full-body topology and differ only in
/// accuracy/cost. `UpperBody` is the 25-point topology without depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    UpperBody,
    Lite,
    Full,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 3] = [ModelVariant::UpperBody, ModelVariant::Lite, ModelVariant::Full];

    pub fn topology(self) -> KeypointTopology {
        match self {
            ModelVariant::UpperBody => KeypointTopology::UPPER_BODY,
            ModelVariant::Lite | ModelVariant::Full => KeypointTopology::FULL_BODY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVariant::UpperBody => "upper-body",
            ModelVariant::Lite => "lite",
            ModelVariant::Full => "full",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upper-body" | "upper_body" | "upperbody" | "upper" => Ok(ModelVariant::UpperBody),
            "lite" => Ok(ModelVariant::Lite),
            "full" => Ok(ModelVariant::Full),
            other => Err(format!(
                "unknown model variant '{}', expected one of: upper-body, lite, full",
                other
            )),
        }
    }
}

/// One output record: a joint position with visibility, or the sentinel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// The trailing record `(score, 0, 0, 0)`.
    pub const fn sentinel(pose_score: f32) -> Self {
        Self::new(pose_score, 0.0, 0.0, 0.0)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.visibility]
    }

    pub fn from_array(values: [f32; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

/// Joint indices as assigned by the trained pose networks.
///
/// The upper-body topology uses the first 25 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseJoint {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseJoint {
    pub const ALL: [PoseJoint; FULL_BODY_VERTEX_COUNT] = [
        PoseJoint::Nose,
        PoseJoint::LeftEyeInner,
        PoseJoint::LeftEye,
        PoseJoint::LeftEyeOuter,
        PoseJoint::RightEyeInner,
        PoseJoint::RightEye,
        PoseJoint::RightEyeOuter,
        PoseJoint::LeftEar,
        PoseJoint::RightEar,
        PoseJoint::MouthLeft,
        PoseJoint::MouthRight,
        PoseJoint::LeftShoulder,
        PoseJoint::RightShoulder,
        PoseJoint::LeftElbow,
        PoseJoint::RightElbow,
        PoseJoint::LeftWrist,
        PoseJoint::RightWrist,
        PoseJoint::LeftPinky,
        PoseJoint::RightPinky,
        PoseJoint::LeftIndex,
        PoseJoint::RightIndex,
        PoseJoint::LeftThumb,
        PoseJoint::RightThumb,
        PoseJoint::LeftHip,
        PoseJoint::RightHip,
        PoseJoint::LeftKnee,
        PoseJoint::RightKnee,
        PoseJoint::LeftAnkle,
        PoseJoint::RightAnkle,
        PoseJoint::LeftHeel,
        PoseJoint::RightHeel,
        PoseJoint::LeftFootIndex,
        PoseJoint::RightFootIndex,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PoseJoint::Nose => "nose",
            PoseJoint::LeftEyeInner => "left_eye_inner",
            PoseJoint::LeftEye => "left_eye",
            PoseJoint::LeftEyeOuter => "left_eye_outer",
            PoseJoint::RightEyeInner => "right_eye_inner",
            PoseJoint::RightEye => "right_eye",
            PoseJoint::RightEyeOuter => "right_eye_outer",
            PoseJoint::LeftEar => "left_ear",
            PoseJoint::RightEar => "right_ear",
            PoseJoint::MouthLeft => "mouth_left",
            PoseJoint::MouthRight => "mouth_right",
            PoseJoint::LeftShoulder => "left_shoulder",
            PoseJoint::RightShoulder => "right_shoulder",
            PoseJoint::LeftElbow => "left_elbow",
            PoseJoint::RightElbow => "right_elbow",
            PoseJoint::LeftWrist => "left_wrist",
            PoseJoint::RightWrist => "right_wrist",
            PoseJoint::LeftPinky => "left_pinky",
            PoseJoint::RightPinky => "right_pinky",
            PoseJoint::LeftIndex => "left_index",
            PoseJoint::RightIndex => "right_index",
            PoseJoint::LeftThumb => "left_thumb",
            PoseJoint::RightThumb => "right_thumb",
            PoseJoint::LeftHip => "left_hip",
            PoseJoint::RightHip => "right_hip",
            PoseJoint::LeftKnee => "left_knee",
            PoseJoint::RightKnee => "right_knee",
            PoseJoint::LeftAnkle => "left_ankle",
            PoseJoint::RightAnkle => "right_ankle",
            PoseJoint::LeftHeel => "left_heel",
            PoseJoint::RightHeel => "right_heel",
            PoseJoint::LeftFootIndex => "left_foot_index",
            PoseJoint::RightFootIndex => "right_foot_index",
        }
    }
}

impl From<PoseJoint> for usize {
    fn from(joint: PoseJoint) -> usize {
        joint.index()
    }
}

impl TryFrom<usize> for PoseJoint {
    type Error = String;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        PoseJoint::ALL.get(value).copied().ok_or_else(|| {
            format!(
                "Invalid joint index: {}. Must be in range 0-{}.",
                value,
                FULL_BODY_VERTEX_COUNT - 1
            )
        })
    }
}
