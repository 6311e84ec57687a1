//! Pipeline coordinator.
//!
//! Wires the sampling scheduler to the camera, detector, overlay renderer
//! and recording controller. One cycle per tick:
//!
//! 1. Snapshot the shared config (read once, never mid-cycle)
//! 2. Check camera readiness; skip the cycle when unready
//! 3. Hand the frame to the inference worker (drop the tick when busy)
//! 4. Worker: detect -> render overlay -> evaluate person trigger -> feed recorder
//!
//! Backpressure policy: the worker queue is bounded at one frame. A tick
//! that finds it full is dropped, never queued, so cycles cannot back up
//! behind slow inference; the newest available frame always wins. Because
//! the worker renders immediately after its own detect call, a cycle's
//! overlay can only ever show that cycle's detections.
//!
//! Reconfiguration discipline: mutating any flag the cycle reads tears the
//! scheduler down and starts a fresh one; a live tick closure is never
//! reconfigured in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use crossbeam_channel::{bounded, Sender, TrySendError};
use image::ExtendedColorType;
use image::ImageEncoder;

use crate::artifact::{Artifact, ArtifactKind, ArtifactSink};
use crate::capture::CameraSource;
use crate::detect::{DetectionBatch, SharedBackend};
use crate::frame::Frame;
use crate::notify::{clamp_volume, CueSounder, Notice, Notifier};
use crate::overlay::{OverlayRenderer, OverlaySurface};
use crate::record::RecordingController;
use crate::schedule::{SamplingScheduler, DEFAULT_CADENCE};

/// Default notification volume.
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Shared mutable pipeline configuration. Mutated only by explicit user
/// actions; each cycle reads one consistent snapshot.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub mirrored: bool,
    pub auto_record: bool,
    pub volume: f32,
    pub cadence: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mirrored: false,
            auto_record: false,
            volume: DEFAULT_VOLUME,
            cadence: DEFAULT_CADENCE,
        }
    }
}

/// Everything the coordinator wires together.
pub struct PipelineDeps {
    pub camera: Arc<Mutex<CameraSource>>,
    pub backend: SharedBackend,
    pub renderer: OverlayRenderer,
    pub controller: Arc<RecordingController>,
    pub sink: Arc<dyn ArtifactSink>,
    pub notifier: Arc<dyn Notifier>,
    pub cue: Arc<dyn CueSounder>,
}

/// One frame plus the config snapshot its cycle runs under.
struct CycleJob {
    frame: Frame,
    config: PipelineConfig,
}

pub struct Pipeline {
    camera: Arc<Mutex<CameraSource>>,
    backend: SharedBackend,
    renderer: Arc<OverlayRenderer>,
    surface: Arc<Mutex<OverlaySurface>>,
    controller: Arc<RecordingController>,
    sink: Arc<dyn ArtifactSink>,
    notifier: Arc<dyn Notifier>,
    cue: Arc<dyn CueSounder>,
    config: Arc<Mutex<PipelineConfig>>,
    scheduler: Option<SamplingScheduler>,
    worker: Option<InferenceWorker>,
    dropped_ticks: Arc<AtomicU64>,
    cycles: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            camera: deps.camera,
            backend: deps.backend,
            renderer: Arc::new(deps.renderer),
            surface: Arc::new(Mutex::new(OverlaySurface::new())),
            controller: deps.controller,
            sink: deps.sink,
            notifier: deps.notifier,
            cue: deps.cue,
            config: Arc::new(Mutex::new(config)),
            scheduler: None,
            worker: None,
            dropped_ticks: Arc::new(AtomicU64::new(0)),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the inference worker and the sampling scheduler. No-op when
    /// already running.
    pub fn start(&mut self) -> Result<()> {
        if self.scheduler.is_some() {
            return Ok(());
        }
        let worker = InferenceWorker::spawn(
            Arc::clone(&self.backend),
            Arc::clone(&self.renderer),
            Arc::clone(&self.surface),
            Arc::clone(&self.controller),
            Arc::clone(&self.cycles),
        );
        let sender = worker.sender();
        self.worker = Some(worker);
        self.scheduler = Some(self.spawn_scheduler(sender)?);
        Ok(())
    }

    /// Stop sampling. The scheduler is torn down first (no new ticks), then
    /// the worker drains its in-flight cycle and exits. The recorder is left
    /// untouched; callers decide whether to finalize an open session.
    pub fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        self.worker = None;
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    fn spawn_scheduler(&self, sender: Sender<CycleJob>) -> Result<SamplingScheduler> {
        let camera = Arc::clone(&self.camera);
        let config = Arc::clone(&self.config);
        let dropped = Arc::clone(&self.dropped_ticks);
        let cadence = self.config_snapshot()?.cadence;

        SamplingScheduler::start(cadence, move || {
            // One consistent snapshot per cycle.
            let Ok(snapshot) = config.lock().map(|c| c.clone()) else {
                return;
            };

            let frame = {
                let Ok(mut camera) = camera.lock() else {
                    return;
                };
                if !camera.ready() {
                    log::trace!("tick skipped: camera not ready");
                    return;
                }
                match camera.next_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("tick skipped: frame capture failed: {:#}", e);
                        return;
                    }
                }
            };
            if !frame.is_ready() {
                log::trace!("tick skipped: incomplete frame");
                return;
            }

            match sender.try_send(CycleJob {
                frame,
                config: snapshot,
            }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Inference still busy: drop, never queue.
                    dropped.fetch_add(1, Ordering::Relaxed);
                    log::trace!("tick dropped: inference in flight");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        })
    }

    /// Tear down and restart the scheduler so the tick closure re-captures
    /// its dependencies. Called after every config mutation.
    fn restart_scheduler(&mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(worker) = &self.worker {
            self.scheduler = Some(self.spawn_scheduler(worker.sender())?);
        }
        Ok(())
    }

    fn config_snapshot(&self) -> Result<PipelineConfig> {
        self.config
            .lock()
            .map(|c| c.clone())
            .map_err(|_| anyhow!("pipeline config lock poisoned"))
    }

    pub fn config(&self) -> PipelineConfig {
        self.config_snapshot().unwrap_or_default()
    }

    /// Toggle horizontal mirroring of the overlay.
    pub fn set_mirrored(&mut self, mirrored: bool) -> Result<()> {
        {
            let mut config = self
                .config
                .lock()
                .map_err(|_| anyhow!("pipeline config lock poisoned"))?;
            config.mirrored = mirrored;
        }
        self.restart_scheduler()
    }

    /// Enable or disable the person auto-trigger.
    pub fn set_auto_record(&mut self, enabled: bool) -> Result<()> {
        {
            let mut config = self
                .config
                .lock()
                .map_err(|_| anyhow!("pipeline config lock poisoned"))?;
            config.auto_record = enabled;
        }
        self.notifier.notify(if enabled {
            Notice::AutoRecordEnabled
        } else {
            Notice::AutoRecordDisabled
        });
        self.restart_scheduler()
    }

    /// Set the notification volume and preview the cue at the new level.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let volume = clamp_volume(volume);
        {
            let mut config = self
                .config
                .lock()
                .map_err(|_| anyhow!("pipeline config lock poisoned"))?;
            config.volume = volume;
        }
        self.cue.play_cue(volume);
        self.restart_scheduler()
    }

    /// Manual record request: stop-and-save when recording (always takes
    /// precedence over the auto-trigger), otherwise start without a cue.
    pub fn toggle_recording(&self) -> Result<()> {
        if !self.camera_available() {
            self.notifier.notify(Notice::CameraUnavailable);
            return Ok(());
        }

        if self.controller.is_recording() {
            self.controller.stop()?;
        } else {
            let volume = self.config_snapshot()?.volume;
            if self.controller.start(false, volume)? {
                self.notifier.notify(Notice::RecordingStarted);
            }
        }
        Ok(())
    }

    /// Capture a single frame as a PNG snapshot artifact. Returns the file
    /// name, or None when the camera is unavailable.
    pub fn capture_snapshot(&self) -> Result<Option<String>> {
        let frame = {
            let mut camera = self
                .camera
                .lock()
                .map_err(|_| anyhow!("camera lock poisoned"))?;
            if !camera.ready() {
                drop(camera);
                self.notifier.notify(Notice::CameraUnavailable);
                return Ok(None);
            }
            camera.next_frame().context("snapshot capture failed")?
        };

        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(
                &frame.pixels,
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            )
            .context("failed to encode snapshot")?;

        let artifact = Artifact::captured_at(ArtifactKind::Snapshot, Local::now(), bytes);
        let file_name = artifact.file_name.clone();
        self.sink.store(&artifact)?;
        self.notifier.notify(Notice::SnapshotSaved {
            file_name: file_name.clone(),
        });
        Ok(Some(file_name))
    }

    /// The overlay surface the presentation layer reads from.
    pub fn overlay_surface(&self) -> Arc<Mutex<OverlaySurface>> {
        Arc::clone(&self.surface)
    }

    pub fn controller(&self) -> Arc<RecordingController> {
        Arc::clone(&self.controller)
    }

    /// Ticks dropped because inference was still in flight.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks.load(Ordering::Relaxed)
    }

    /// Completed detection cycles.
    pub fn completed_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn camera_available(&self) -> bool {
        self.camera
            .lock()
            .map(|camera| camera.ready())
            .unwrap_or(false)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Inference worker
// ----------------------------------------------------------------------------

/// Single worker thread running detect -> render -> trigger for one frame at
/// a time. The bounded(1) inbox is the backpressure valve.
struct InferenceWorker {
    sender: Option<Sender<CycleJob>>,
    thread: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    fn spawn(
        backend: SharedBackend,
        renderer: Arc<OverlayRenderer>,
        surface: Arc<Mutex<OverlaySurface>>,
        controller: Arc<RecordingController>,
        cycles: Arc<AtomicU64>,
    ) -> Self {
        let (sender, receiver) = bounded::<CycleJob>(1);

        let thread = std::thread::spawn(move || {
            for job in receiver {
                run_cycle(&job, &backend, &renderer, &surface, &controller);
                cycles.fetch_add(1, Ordering::Relaxed);
            }
        });

        Self {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    fn sender(&self) -> Sender<CycleJob> {
        self.sender
            .as_ref()
            .expect("worker sender taken before drop")
            .clone()
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain its last job and exit.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("inference worker thread panicked");
            }
        }
    }
}

fn run_cycle(
    job: &CycleJob,
    backend: &SharedBackend,
    renderer: &OverlayRenderer,
    surface: &Mutex<OverlaySurface>,
    controller: &Arc<RecordingController>,
) {
    let frame = &job.frame;

    // Inference failure degrades to an empty batch; the next tick retries
    // naturally.
    let batch = {
        let detected = backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))
            .and_then(|mut backend| backend.detect(&frame.pixels, frame.width, frame.height));
        match detected {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("detection failed, treating cycle as empty: {:#}", e);
                DetectionBatch::default()
            }
        }
    };

    // Draw this cycle's detections before anything else observes them.
    if let Ok(mut surface) = surface.lock() {
        renderer.render(
            &mut surface,
            &batch,
            job.config.mirrored,
            frame.width,
            frame.height,
        );
    }

    if job.config.auto_record && batch.contains_person() {
        match controller.start(true, job.config.volume) {
            Ok(true) => log::info!("auto-record triggered by person detection"),
            Ok(false) => {}
            Err(e) => log::error!("auto-record start failed: {:#}", e),
        }
    }

    if controller.is_recording() {
        if let Err(e) = controller.record_frame(frame) {
            log::warn!("failed to append frame to recording: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemorySink;
    use crate::capture::{CameraConfig, CameraSource};
    use crate::detect::{BackendRegistry, StubBackend};
    use crate::notify::{MemoryCue, MemoryNotifier};
    use crate::record::DEFAULT_JPEG_QUALITY;

    fn build_pipeline(
        connect_camera: bool,
        config: PipelineConfig,
    ) -> (Pipeline, Arc<MemorySink>, Arc<MemoryNotifier>) {
        let mut camera = CameraSource::new(CameraConfig {
            url: "stub://pipeline-test".to_string(),
            target_fps: 30,
            width: 64,
            height: 48,
        })
        .expect("camera");
        if connect_camera {
            camera.connect().expect("connect");
        }

        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        let backend = registry.default_backend().expect("backend");

        let sink = Arc::new(MemorySink::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let cue = Arc::new(MemoryCue::new());
        let controller = Arc::new(RecordingController::new(
            sink.clone(),
            notifier.clone(),
            cue.clone(),
            Duration::from_secs(30),
            DEFAULT_JPEG_QUALITY,
        ));

        let pipeline = Pipeline::new(
            PipelineDeps {
                camera: Arc::new(Mutex::new(camera)),
                backend,
                renderer: OverlayRenderer::new(),
                controller,
                sink: sink.clone(),
                notifier: notifier.clone(),
                cue,
            },
            config,
        );
        (pipeline, sink, notifier)
    }

    #[test]
    fn snapshot_requires_an_available_camera() {
        let (pipeline, sink, notifier) = build_pipeline(false, PipelineConfig::default());

        let saved = pipeline.capture_snapshot().unwrap();
        assert!(saved.is_none());
        assert!(sink.is_empty());
        assert!(notifier.notices().contains(&Notice::CameraUnavailable));
    }

    #[test]
    fn snapshot_emits_a_png_artifact() {
        let (pipeline, sink, _notifier) = build_pipeline(true, PipelineConfig::default());

        let file_name = pipeline.capture_snapshot().unwrap().expect("file name");
        assert!(file_name.ends_with(".png"));

        let artifacts = sink.artifacts();
        assert_eq!(artifacts.len(), 1);
        // PNG magic.
        assert_eq!(&artifacts[0].bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn manual_toggle_against_missing_camera_notifies() {
        let (pipeline, _sink, notifier) = build_pipeline(false, PipelineConfig::default());

        pipeline.toggle_recording().unwrap();
        assert!(notifier.notices().contains(&Notice::CameraUnavailable));
        assert!(!pipeline.controller().is_recording());
    }

    #[test]
    fn manual_toggle_starts_then_stops_and_saves() {
        let (pipeline, sink, notifier) = build_pipeline(true, PipelineConfig::default());

        pipeline.toggle_recording().unwrap();
        assert!(pipeline.controller().is_recording());
        assert!(notifier.notices().contains(&Notice::RecordingStarted));

        pipeline.toggle_recording().unwrap();
        assert!(!pipeline.controller().is_recording());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn auto_record_toggle_notifies_both_ways() {
        let (mut pipeline, _sink, notifier) = build_pipeline(true, PipelineConfig::default());

        pipeline.set_auto_record(true).unwrap();
        pipeline.set_auto_record(false).unwrap();

        let notices = notifier.notices();
        assert!(notices.contains(&Notice::AutoRecordEnabled));
        assert!(notices.contains(&Notice::AutoRecordDisabled));
    }

    #[test]
    fn start_is_idempotent_and_stop_tears_down() {
        let (mut pipeline, _sink, _notifier) = build_pipeline(true, PipelineConfig::default());

        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());

        pipeline.stop();
        assert!(!pipeline.is_running());
        pipeline.stop();
    }
}
