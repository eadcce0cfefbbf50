use anyhow::{bail, Context, Result};
use clap::Parser;
use pose_landmark::capture::{CaptureSource, StillImageSource};
use pose_landmark::landmark::{ModelAssetSet, OrtEngine};
use pose_landmark::{Device, Landmarker, ModelVariant, PoseJoint};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Read frames from a still image instead of a camera
    #[arg(long)]
    image: Option<PathBuf>,

    /// Input webcam device index
    #[cfg(feature = "camera")]
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[cfg(feature = "camera")]
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[cfg(feature = "camera")]
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Upper-body (25 keypoint) model (ONNX file)
    #[arg(long)]
    upper_body_model: Option<PathBuf>,

    /// Lite full-body (33 keypoint) model (ONNX file)
    #[arg(long)]
    lite_model: Option<PathBuf>,

    /// Full full-body (33 keypoint) model (ONNX file)
    #[arg(long)]
    full_model: Option<PathBuf>,

    /// Model variant to start with: upper-body, lite or full
    #[arg(long, default_value = "full")]
    variant: ModelVariant,

    /// Rotate through the loaded variants every N frames (0 disables)
    #[arg(long, default_value_t = 0)]
    cycle_variants: u64,

    /// Execution device: cpu, cuda[:id], tensorrt[:id]
    #[arg(long, default_value = "cpu")]
    device: Device,

    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames (0 runs until interrupted)
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Write the final segmentation mask to this PNG file
    #[arg(long)]
    dump_mask: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("pose-landmark starting");
    tracing::info!("Device: {}", args.device);
    tracing::info!("Target FPS: {}", args.fps);

    let assets = load_assets(&args)?;
    let variants = assets.variants();
    tracing::info!(
        "Model variants available: {}",
        variants
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut capture = open_capture(&args)?;
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    let engine = OrtEngine::new(args.device.clone()).with_intra_threads(args.threads);
    let mut landmarker = Landmarker::new(&assets, Box::new(engine), args.variant)
        .context("Failed to initialize landmarker")?;

    let schedule = VariantSchedule::new(args.variant, variants, args.cycle_variants);
    run_pipeline(capture.as_mut(), &mut landmarker, &schedule, &args)?;

    if let Some(path) = &args.dump_mask {
        let mask = landmarker
            .segmentation_mask()
            .context("Segmentation mask is not available")?;
        mask.to_gray_image()
            .save(path)
            .with_context(|| format!("Failed to write mask to {}", path.display()))?;
        tracing::info!("Segmentation mask written to {}", path.display());
    }

    landmarker.shutdown();
    Ok(())
}

fn load_assets(args: &Args) -> Result<ModelAssetSet> {
    let mut assets = ModelAssetSet::new();
    let candidates = [
        (ModelVariant::UpperBody, &args.upper_body_model),
        (ModelVariant::Lite, &args.lite_model),
        (ModelVariant::Full, &args.full_model),
    ];
    for (variant, path) in candidates {
        if let Some(path) = path {
            tracing::info!("Registering {} model {}", variant, path.display());
            assets = assets.with_graph(variant, path.clone());
        }
    }

    if assets.graph(args.variant).is_none() {
        bail!(
            "No model given for the starting variant '{}' (see --help for the model flags)",
            args.variant
        );
    }
    Ok(assets)
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    if let Some(path) = &args.image {
        let source = StillImageSource::open(path).context("Failed to open still image")?;
        return Ok(Box::new(source));
    }
    open_camera(args)
}

#[cfg(feature = "camera")]
fn open_camera(args: &Args) -> Result<Box<dyn CaptureSource>> {
    let capture = pose_landmark::capture::WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        args.fps,
    )
    .context("Failed to initialize webcam capture")?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_args: &Args) -> Result<Box<dyn CaptureSource>> {
    bail!("No --image given and camera support is not compiled in (enable the 'camera' feature)")
}

/// Which variant to request on a given frame.
struct VariantSchedule {
    order: Vec<ModelVariant>,
    start: usize,
    period: u64,
}

impl VariantSchedule {
    fn new(initial: ModelVariant, available: Vec<ModelVariant>, period: u64) -> Self {
        let start = available.iter().position(|&v| v == initial).unwrap_or(0);
        Self {
            order: available,
            start,
            period,
        }
    }

    fn variant_for(&self, frame: u64, fallback: ModelVariant) -> ModelVariant {
        if self.period == 0 || self.order.is_empty() {
            return fallback;
        }
        let step = (frame / self.period) as usize;
        self.order[(self.start + step) % self.order.len()]
    }
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    landmarker: &mut Landmarker<'_>,
    schedule: &VariantSchedule,
    args: &Args,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / args.fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut skipped_frames = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_landmark_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    if schedule.period > 0 {
        tracing::info!("Switching variants every {} frames", schedule.period);
    }

    loop {
        if args.frames > 0 && frame_count >= args.frames {
            break;
        }
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = capture.capture_frame().context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        // Landmarks
        let variant = schedule.variant_for(frame_count, args.variant);
        let landmark_start = Instant::now();
        match landmarker.process_image(&frame, variant) {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                tracing::warn!("Skipping frame {}: {}", frame_count, err);
                skipped_frames += 1;
            }
            Err(err) => return Err(err).context("Landmark pipeline failed"),
        }
        total_landmark_time += landmark_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            log_stats(
                landmarker,
                frame_count,
                skipped_frames,
                total_capture_time,
                total_landmark_time,
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    log_stats(
        landmarker,
        frame_count,
        skipped_frames,
        total_capture_time,
        total_landmark_time,
    );
    Ok(())
}

fn log_stats(
    landmarker: &Landmarker<'_>,
    frame_count: u64,
    skipped_frames: u64,
    total_capture_time: Duration,
    total_landmark_time: Duration,
) {
    if frame_count == 0 {
        return;
    }
    let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
    let avg_landmark_ms = total_landmark_time.as_secs_f64() * 1000.0 / frame_count as f64;
    let total_ms = avg_capture_ms + avg_landmark_ms;
    let actual_fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

    let Some(output) = landmarker.output_buffer() else {
        return;
    };
    let score = output.pose_score().unwrap_or(0.0);
    let nose = output.get(PoseJoint::Nose.index()).unwrap_or_default();

    tracing::info!(
        "Frame {}: variant={}, capture={:.1}ms, landmark={:.1}ms, fps={:.1}, skipped={}, pose_score={:.2}, nose=({:.3}, {:.3})",
        frame_count,
        landmarker
            .active_variant()
            .map(|v| v.as_str())
            .unwrap_or("none"),
        avg_capture_ms,
        avg_landmark_ms,
        actual_fps,
        skipped_frames,
        score,
        nose.x,
        nose.y
    );

    if let Some(world) = landmarker.world_landmark_buffer() {
        let hip = world.get(PoseJoint::LeftHip.index()).unwrap_or_default();
        tracing::debug!(
            "Left hip (world): ({:.3}, {:.3}, {:.3}) m",
            hip.x,
            hip.y,
            hip.z
        );
    }
}
