mod common;

use common::{MockGraph, MockSession};
use pose_landmark::landmark::{
    DecodeKernel, EngineSession, InputFrameBuffer, LandmarkBuffer, LandmarkDecodeKernel,
    LogicalOutput, OutputDecoder, OutputInfo, OutputNames, OutputRegistry, RawOutputs,
    SegmentationMask,
};
use pose_landmark::{KeypointTopology, Landmark, ModelVariant, PoseError};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Value written into every slot of the trailing auxiliary points.
const AUXILIARY: f32 = 9999.0;

/// Full-length raw landmark vector placing joint `i` at input pixel `(8i, 4i)`,
/// followed by auxiliary points filled with `AUXILIARY`.
fn encode_landmarks(topology: &KeypointTopology, visibility_logit: f32) -> Vec<f32> {
    let mut raw: Vec<f32> = (0..topology.vertex_count)
        .flat_map(|i| {
            let i = i as f32;
            [i * 8.0, i * 4.0, 32.0 - i, visibility_logit, 1.0]
        })
        .collect();
    raw.resize(topology.landmark_vector_length, AUXILIARY);
    raw
}

fn encode_world_landmarks(topology: &KeypointTopology) -> Vec<f32> {
    let mut raw: Vec<f32> = (0..topology.vertex_count)
        .flat_map(|i| [i as f32 * 0.01, 0.2, -0.3])
        .collect();
    raw.resize(topology.world_landmark_vector_length.unwrap_or(0), AUXILIARY);
    raw
}

fn touches_auxiliary(landmark: &Landmark) -> bool {
    landmark
        .to_array()
        .iter()
        .any(|&v| v == AUXILIARY || v == AUXILIARY / 256.0)
}

#[test]
fn test_full_body_decode_round_trip() {
    let topology = KeypointTopology::FULL_BODY;
    let landmarks_raw = encode_landmarks(&topology, 2.0);
    let world_raw = encode_world_landmarks(&topology);
    assert_eq!(landmarks_raw.len(), 195);
    assert_eq!(world_raw.len(), 117);
    let segmentation = vec![0.0; 128 * 128];
    let raw = RawOutputs {
        pose_flag: &[0.87],
        landmarks: &landmarks_raw,
        world_landmarks: Some(&world_raw),
        segmentation: &segmentation,
    };

    let landmarks = LandmarkBuffer::new(topology.record_count());
    let world = LandmarkBuffer::new(topology.record_count());
    LandmarkDecodeKernel.dispatch(&topology, &raw, &landmarks, Some(&world));

    for (i, joint) in topology.joints().iter().enumerate() {
        assert_eq!(joint.index(), i);
        let decoded = landmarks.load(i).unwrap();
        let p = i as f32;
        // Scaling by 1/256 is exact for these inputs.
        assert_eq!(decoded.x, p * 8.0 / 256.0);
        assert_eq!(decoded.y, p * 4.0 / 256.0);
        assert_eq!(decoded.z, (32.0 - p) / 256.0);
        assert_eq!(decoded.visibility, sigmoid(2.0));

        let metric = world.load(i).unwrap();
        assert_eq!(metric.x, p * 0.01);
        assert_eq!((metric.y, metric.z), (0.2, -0.3));
        assert_eq!(metric.visibility, decoded.visibility);
    }
    assert_eq!(landmarks.load(33), Some(Landmark::sentinel(0.87)));
    assert_eq!(world.load(33), Some(Landmark::sentinel(0.87)));
    assert_eq!(landmarks.load(34), None);

    // Auxiliary points never reach the published records.
    assert!(!landmarks.reader().snapshot().iter().any(touches_auxiliary));
    assert!(!world.reader().snapshot().iter().any(touches_auxiliary));
}

#[test]
fn test_upper_body_decode_ignores_depth() {
    let topology = KeypointTopology::UPPER_BODY;
    let landmarks_raw = encode_landmarks(&topology, -1.5);
    assert_eq!(landmarks_raw.len(), 155);
    let segmentation = vec![0.0; 128 * 128];
    let raw = RawOutputs {
        pose_flag: &[0.3],
        landmarks: &landmarks_raw,
        world_landmarks: None,
        segmentation: &segmentation,
    };

    let landmarks = LandmarkBuffer::new(topology.record_count());
    LandmarkDecodeKernel.dispatch(&topology, &raw, &landmarks, None);

    let records = landmarks.reader().snapshot();
    assert_eq!(records.len(), 26);
    for record in &records[..25] {
        assert_eq!(record.z, 0.0);
        assert_eq!(record.visibility, sigmoid(-1.5));
    }
    assert_eq!(records[24].x, 24.0 * 8.0 / 256.0);
    assert_eq!(records[25], Landmark::sentinel(0.3));
    assert!(!records.iter().any(touches_auxiliary));
}

#[test]
fn test_pose_score_is_clamped() {
    let topology = KeypointTopology::UPPER_BODY;
    let landmarks_raw = encode_landmarks(&topology, 0.0);
    let segmentation = vec![0.0; 128 * 128];
    let landmarks = LandmarkBuffer::new(topology.record_count());

    for (score, expected) in [(-0.2, 0.0), (1.7, 1.0), (0.5, 0.5)] {
        let pose_flag = [score];
        let raw = RawOutputs {
            pose_flag: &pose_flag,
            landmarks: &landmarks_raw,
            world_landmarks: None,
            segmentation: &segmentation,
        };
        LandmarkDecodeKernel.dispatch(&topology, &raw, &landmarks, None);
        assert_eq!(landmarks.reader().pose_score(), Some(expected));
    }
}

fn session_for(graph: MockGraph) -> MockSession {
    MockSession::new(graph, Arc::new(AtomicUsize::new(0)))
}

#[test]
fn test_output_decoder_publishes_mask() {
    let variant = ModelVariant::Lite;
    let mut session = session_for(MockGraph::for_variant(variant));
    session.execute(&InputFrameBuffer::new()).unwrap();
    let registry =
        OutputRegistry::resolve(variant, &OutputNames::default(), session.outputs()).unwrap();

    let topology = variant.topology();
    let landmarks = LandmarkBuffer::new(topology.record_count());
    let world = LandmarkBuffer::new(topology.record_count());
    let mask = SegmentationMask::new();
    let mut decoder = OutputDecoder::new();

    decoder
        .decode(
            &LandmarkDecodeKernel,
            &topology,
            &registry,
            &session,
            &landmarks,
            Some(&world),
            &mask,
        )
        .unwrap();

    assert_eq!(landmarks.reader().pose_score(), Some(0.0));
    let pixels = mask.snapshot();
    assert_eq!(pixels[[1, 0]], common::raw_segmentation(1, 0));
    assert_eq!(pixels[[2, 3]], common::raw_segmentation(2, 3));
    // (y=1, x=127) carries 255/255.
    assert_eq!(mask.to_gray_image().get_pixel(127, 1)[0], 255);
}

#[test]
fn test_output_decoder_rejects_short_world_vector() {
    let variant = ModelVariant::Full;
    let mut session = session_for(MockGraph {
        world_len: Some(99),
        declare_shapes: false,
        ..MockGraph::for_variant(variant)
    });
    session.execute(&InputFrameBuffer::new()).unwrap();
    let registry =
        OutputRegistry::resolve(variant, &OutputNames::default(), session.outputs()).unwrap();

    let topology = variant.topology();
    let landmarks = LandmarkBuffer::new(topology.record_count());
    let world = LandmarkBuffer::new(topology.record_count());
    let mask = SegmentationMask::new();

    let err = OutputDecoder::new()
        .decode(
            &LandmarkDecodeKernel,
            &topology,
            &registry,
            &session,
            &landmarks,
            Some(&world),
            &mask,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        PoseError::TopologyMismatch {
            expected: 117,
            actual: 99,
            ..
        }
    ));

    assert!(landmarks
        .reader()
        .snapshot()
        .iter()
        .all(|landmark| *landmark == Landmark::default()));
    assert!(mask.snapshot().iter().all(|&v| v == 0.0));
}

#[test]
fn test_custom_decode_kernel_is_used() {
    struct ConstantKernel;

    impl DecodeKernel for ConstantKernel {
        fn dispatch(
            &self,
            topology: &KeypointTopology,
            _raw: &RawOutputs<'_>,
            landmarks: &LandmarkBuffer,
            _world_landmarks: Option<&LandmarkBuffer>,
        ) {
            for index in 0..topology.vertex_count {
                landmarks.store(index, Landmark::new(0.5, 0.5, 0.0, 1.0));
            }
            landmarks.store(topology.sentinel_index(), Landmark::sentinel(0.9));
        }
    }

    let variant = ModelVariant::UpperBody;
    let mut session = session_for(MockGraph::for_variant(variant));
    session.execute(&InputFrameBuffer::new()).unwrap();
    let registry =
        OutputRegistry::resolve(variant, &OutputNames::default(), session.outputs()).unwrap();
    let topology = variant.topology();
    let landmarks = LandmarkBuffer::new(topology.record_count());

    OutputDecoder::new()
        .decode(
            &ConstantKernel,
            &topology,
            &registry,
            &session,
            &landmarks,
            None,
            &SegmentationMask::new(),
        )
        .unwrap();

    let reader = landmarks.reader();
    assert_eq!(reader.get(24), Some(Landmark::new(0.5, 0.5, 0.0, 1.0)));
    assert_eq!(reader.pose_score(), Some(0.9));
}

#[test]
fn test_registry_requires_core_outputs() {
    let declared = vec![
        OutputInfo {
            name: "output_poseflag".to_string(),
            element_count: Some(1),
        },
        OutputInfo {
            name: "ld_3d".to_string(),
            element_count: Some(195),
        },
    ];

    let err = OutputRegistry::resolve(ModelVariant::Full, &OutputNames::default(), &declared)
        .unwrap_err();
    match err {
        PoseError::MissingOutput { variant, output } => {
            assert_eq!(variant, ModelVariant::Full);
            assert_eq!(output, "output_segmentation");
        }
        other => panic!("expected MissingOutput, got {other:?}"),
    }
}

#[test]
fn test_registry_uses_custom_names() {
    let names = OutputNames {
        pose_flag: "Identity_1".to_string(),
        landmarks: "Identity".to_string(),
        world_landmarks: "Identity_4".to_string(),
        segmentation: "Identity_2".to_string(),
    };
    let declared: Vec<OutputInfo> = [
        ("Identity", Some(195)),
        ("Identity_1", Some(1)),
        ("Identity_2", None),
    ]
    .into_iter()
    .map(|(name, element_count)| OutputInfo {
        name: name.to_string(),
        element_count,
    })
    .collect();

    let registry = OutputRegistry::resolve(ModelVariant::Lite, &names, &declared).unwrap();
    assert_eq!(registry.variant(), ModelVariant::Lite);
    assert_eq!(
        registry.tensor_name(LogicalOutput::Landmarks),
        Some("Identity")
    );
    assert_eq!(
        registry.tensor_name(LogicalOutput::Segmentation),
        Some("Identity_2")
    );
    assert!(!registry.contains(LogicalOutput::WorldLandmarks));
}

#[test]
fn test_upper_body_registry_skips_world_output() {
    let declared: Vec<OutputInfo> = [
        ("output_poseflag", 1),
        ("ld_3d", 155),
        ("world_3d", 117),
        ("output_segmentation", 128 * 128),
    ]
    .into_iter()
    .map(|(name, count)| OutputInfo {
        name: name.to_string(),
        element_count: Some(count),
    })
    .collect();

    let registry =
        OutputRegistry::resolve(ModelVariant::UpperBody, &OutputNames::default(), &declared)
            .unwrap();
    assert!(!registry.contains(LogicalOutput::WorldLandmarks));
    assert!(registry.contains(LogicalOutput::Landmarks));
}

#[test]
fn test_session_reports_tensor_shapes() {
    let mut session = session_for(MockGraph::for_variant(ModelVariant::Full));
    assert!(session.peek_output("output_segmentation").is_none());
    session.execute(&InputFrameBuffer::new()).unwrap();

    let mask = session.peek_output("output_segmentation").unwrap();
    assert_eq!(mask.shape, &[1, 128, 128, 1]);
    assert_eq!(mask.shape.iter().product::<usize>(), mask.len());

    let landmarks = session.peek_output("ld_3d").unwrap();
    assert_eq!(landmarks.shape, &[1, 195]);
}
