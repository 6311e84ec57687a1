//! guardcamd - GuardCam capture daemon
//!
//! This daemon:
//! 1. Opens the configured camera source
//! 2. Warms up the selected detector backend
//! 3. Samples frames at a fixed cadence and runs detection on each sample
//! 4. Renders the annotated overlay and evaluates the auto-record trigger
//! 5. Writes finished recordings/snapshots into the output directory
//! 6. Logs camera health and pipeline stats every few seconds

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use guardcam::{
    BackendRegistry, CameraSource, CpuBackend, FilesystemSink, GuardcamConfig, LogCue,
    LogNotifier, OverlayRenderer, Pipeline, PipelineDeps, RecordingController, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera URL override (stub:// selects the synthetic source).
    #[arg(long)]
    camera_url: Option<String>,
    /// Output directory override for recordings and snapshots.
    #[arg(long)]
    output_dir: Option<String>,
    /// Detector backend override (stub, cpu, tract).
    #[arg(long)]
    backend: Option<String>,
    /// Start with automatic person-triggered recording enabled.
    #[arg(long)]
    auto_record: bool,
    /// Mirror the overlay horizontally.
    #[arg(long)]
    mirrored: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = GuardcamConfig::load()?;
    if let Some(url) = args.camera_url {
        cfg.camera.url = url;
    }
    if let Some(dir) = args.output_dir {
        cfg.recording.output_dir = dir.into();
    }
    if let Some(backend) = args.backend {
        cfg.detector.backend = backend;
    }
    if args.auto_record {
        cfg.pipeline.auto_record = true;
    }
    if args.mirrored {
        cfg.pipeline.mirrored = true;
    }

    let registry = build_registry(&cfg)?;
    let backend = registry
        .get(&cfg.detector.backend)
        .ok_or_else(|| anyhow!("detector backend '{}' not registered", cfg.detector.backend))?;
    backend
        .lock()
        .map_err(|_| anyhow!("detector backend lock poisoned"))?
        .warm_up()?;
    log::info!("detector '{}' ready", cfg.detector.backend);

    let mut camera = CameraSource::new(cfg.camera_config())?;
    camera.connect()?;
    let camera = Arc::new(Mutex::new(camera));

    let mut renderer = OverlayRenderer::new();
    if let Some(font_path) = &cfg.detector.font_path {
        renderer.load_font(font_path)?;
        log::info!("overlay labels use font {}", font_path.display());
    }

    let sink = Arc::new(FilesystemSink::new(&cfg.recording.output_dir)?);
    let notifier = Arc::new(LogNotifier);
    let cue = Arc::new(LogCue);
    let controller = Arc::new(RecordingController::new(
        sink.clone(),
        notifier.clone(),
        cue.clone(),
        cfg.recording.max_duration,
        cfg.recording.jpeg_quality,
    ));

    let mut pipeline = Pipeline::new(
        PipelineDeps {
            camera: Arc::clone(&camera),
            backend,
            renderer,
            controller: Arc::clone(&controller),
            sink,
            notifier,
            cue,
        },
        cfg.pipeline_config(),
    );
    pipeline.start()?;

    log::info!(
        "guardcamd running: cadence {} ms, watchdog {} ms, output {}",
        cfg.pipeline.cadence.as_millis(),
        cfg.recording.max_duration.as_millis(),
        cfg.recording.output_dir.display()
    );
    if cfg.pipeline.auto_record {
        log::info!("auto-record is enabled: a person in frame starts a recording");
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("guardcamd waiting for shutdown signal (Ctrl-C)...");
    loop {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let (healthy, stats) = {
                    let Ok(camera) = camera.lock() else {
                        break;
                    };
                    (camera.is_healthy(), camera.stats())
                };
                log::info!(
                    "camera health={} frames={} url={} cycles={} dropped_ticks={} recorder={:?}",
                    healthy,
                    stats.frames_captured,
                    stats.url,
                    pipeline.completed_cycles(),
                    pipeline.dropped_ticks(),
                    controller.state()
                );
            }
        }
    }

    log::info!("shutdown signal received, stopping pipeline...");
    pipeline.stop();
    if controller.is_recording() {
        log::info!("finalizing open recording session");
        controller.stop()?;
    }
    log::info!("guardcamd stopped");
    Ok(())
}

fn build_registry(cfg: &GuardcamConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(CpuBackend::new());
    registry.register(StubBackend::new());

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &cfg.detector.model_path {
        let backend = guardcam::TractBackend::new(model_path, cfg.camera.width, cfg.camera.height)?
            .with_threshold(cfg.detector.min_confidence);
        registry.register(backend);
    }
    #[cfg(not(feature = "backend-tract"))]
    if cfg.detector.backend == "tract" {
        return Err(anyhow!(
            "detector backend 'tract' requires the backend-tract feature"
        ));
    }

    Ok(registry)
}
