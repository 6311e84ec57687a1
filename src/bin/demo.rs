//! demo - end-to-end synthetic run of the GuardCam pipeline
//!
//! Runs the full sampling/detection/recording loop against the synthetic
//! camera and a scripted detector: a person walks into frame shortly after
//! start, auto-record kicks in, and the clip lands in the output directory.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use guardcam::{
    BackendRegistry, CameraConfig, CameraSource, FilesystemSink, LogCue, LogNotifier,
    OverlayRenderer, Pipeline, PipelineConfig, PipelineDeps, RecordingController, StubBackend,
    DEFAULT_JPEG_QUALITY,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration of the run in seconds.
    #[arg(long, default_value_t = 3)]
    seconds: u64,
    /// Sampling cadence in milliseconds.
    #[arg(long, default_value_t = 50)]
    cadence_ms: u64,
    /// Number of scripted person sightings.
    #[arg(long, default_value_t = 10)]
    sightings: usize,
    /// Output directory for the recorded clip.
    #[arg(long, default_value = "demo_out")]
    out: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.seconds == 0 {
        return Err(anyhow!("seconds must be >= 1"));
    }
    if args.cadence_ms == 0 {
        return Err(anyhow!("cadence-ms must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);

    stage("open synthetic camera + scripted detector");
    let mut camera = CameraSource::new(CameraConfig {
        url: "stub://demo".to_string(),
        target_fps: 30,
        width: 320,
        height: 240,
    })?;
    camera.connect()?;
    let camera = Arc::new(Mutex::new(camera));

    let stub = StubBackend::new();
    let script = stub.script_handle();
    let mut registry = BackendRegistry::new();
    registry.register(stub);
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("stub backend missing"))?;

    let sink = Arc::new(FilesystemSink::new(&out_dir)?);
    let notifier = Arc::new(LogNotifier);
    let cue = Arc::new(LogCue);
    let controller = Arc::new(RecordingController::new(
        sink.clone(),
        notifier.clone(),
        cue.clone(),
        Duration::from_secs(30),
        DEFAULT_JPEG_QUALITY,
    ));

    let mut pipeline = Pipeline::new(
        PipelineDeps {
            camera: Arc::clone(&camera),
            backend,
            renderer: OverlayRenderer::new(),
            controller: Arc::clone(&controller),
            sink,
            notifier,
            cue,
        },
        PipelineConfig {
            auto_record: true,
            cadence: Duration::from_millis(args.cadence_ms),
            ..PipelineConfig::default()
        },
    );

    stage("run pipeline");
    script.push_person_batches(args.sightings, 0.9);
    pipeline.start()?;
    std::thread::sleep(Duration::from_secs(args.seconds));
    pipeline.stop();

    if controller.is_recording() {
        stage("finalize recording");
        controller.stop()?;
    }

    let frames = {
        let camera = camera
            .lock()
            .map_err(|_| anyhow!("camera lock poisoned"))?;
        camera.stats().frames_captured
    };
    let clips = std::fs::read_dir(&out_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "mjpeg")
        })
        .count();

    println!("demo summary:");
    println!("  frames captured: {}", frames);
    println!("  detection cycles: {}", pipeline.completed_cycles());
    println!("  dropped ticks: {}", pipeline.dropped_ticks());
    println!("  clips saved: {}", clips);
    println!("  output dir: {}", out_dir.display());
    println!("next steps:");
    println!("  ls -la {}", out_dir.display());
    println!("  RUST_LOG=debug cargo run --bin guardcamd -- --auto-record");

    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
