//! End-to-end pipeline tests: synthetic camera, scripted detector, in-memory
//! persistence and notification boundaries.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use guardcam::{
    ArtifactKind, BackendRegistry, CameraConfig, CameraSource, MemoryCue, MemoryNotifier,
    MemorySink, Notice, OverlayRenderer, Pipeline, PipelineConfig, PipelineDeps, RecorderState,
    RecordingController, StubBackend, StubScript, DEFAULT_JPEG_QUALITY,
};

struct Harness {
    pipeline: Pipeline,
    controller: Arc<RecordingController>,
    sink: Arc<MemorySink>,
    notifier: Arc<MemoryNotifier>,
    cue: Arc<MemoryCue>,
    script: StubScript,
}

fn harness(connect_camera: bool, max_duration: Duration, config: PipelineConfig) -> Harness {
    let mut camera = CameraSource::new(CameraConfig {
        url: "stub://integration".to_string(),
        target_fps: 50,
        width: 64,
        height: 48,
    })
    .expect("camera");
    if connect_camera {
        camera.connect().expect("connect");
    }

    let stub = StubBackend::new();
    let script = stub.script_handle();
    let mut registry = BackendRegistry::new();
    registry.register(stub);
    let backend = registry.default_backend().expect("backend");

    let sink = Arc::new(MemorySink::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let cue = Arc::new(MemoryCue::new());
    let controller = Arc::new(RecordingController::new(
        sink.clone(),
        notifier.clone(),
        cue.clone(),
        max_duration,
        DEFAULT_JPEG_QUALITY,
    ));

    let pipeline = Pipeline::new(
        PipelineDeps {
            camera: Arc::new(Mutex::new(camera)),
            backend,
            renderer: OverlayRenderer::new(),
            controller: Arc::clone(&controller),
            sink: sink.clone(),
            notifier: notifier.clone(),
            cue: cue.clone(),
        },
        config,
    );

    Harness {
        pipeline,
        controller,
        sink,
        notifier,
        cue,
        script,
    }
}

fn fast_config(auto_record: bool) -> PipelineConfig {
    PipelineConfig {
        auto_record,
        cadence: Duration::from_millis(20),
        ..PipelineConfig::default()
    }
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

#[test]
fn person_detection_starts_exactly_one_recording_with_cue() {
    let mut h = harness(true, Duration::from_secs(30), fast_config(true));

    // A person stays in frame for many consecutive cycles; only the first
    // sighting may start a session.
    h.script.push_person_batches(12, 0.9);
    h.pipeline.start().expect("start");

    assert!(
        wait_until(Duration::from_secs(2), || h.controller.is_recording()),
        "auto-record should have triggered"
    );
    // Let the remaining person sightings hit the already-recording controller.
    std::thread::sleep(Duration::from_millis(300));
    h.pipeline.stop();

    assert!(h.controller.is_recording(), "still one open session");
    assert_eq!(h.cue.played().len(), 1, "exactly one cue for one session");

    h.controller.stop().expect("finalize");
    let artifacts = h.sink.artifacts();
    assert_eq!(artifacts.len(), 1, "one session, one artifact");
    assert_eq!(artifacts[0].kind, ArtifactKind::Clip);
    assert!(
        !artifacts[0].bytes.is_empty(),
        "recorded cycles appended chunks"
    );
    assert!(h
        .notifier
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::RecordingSaved { .. })));
}

#[test]
fn person_detection_is_ignored_when_auto_record_is_off() {
    let mut h = harness(true, Duration::from_secs(30), fast_config(false));

    h.script.push_person_batches(8, 0.9);
    h.pipeline.start().expect("start");
    std::thread::sleep(Duration::from_millis(400));
    h.pipeline.stop();

    assert_eq!(h.controller.state(), RecorderState::Idle);
    assert!(h.sink.is_empty());
    assert!(h.cue.played().is_empty());
}

#[test]
fn watchdog_bounds_an_auto_recording_to_one_artifact() {
    let mut h = harness(true, Duration::from_millis(150), fast_config(true));

    // Three sightings, all inside the watchdog window.
    h.script.push_person_batches(3, 0.9);
    h.pipeline.start().expect("start");

    assert!(
        wait_until(Duration::from_secs(2), || h.controller.is_recording()),
        "auto-record should have triggered"
    );
    assert!(
        wait_until(Duration::from_secs(2), || {
            h.controller.state() == RecorderState::Idle
        }),
        "watchdog should have stopped the session"
    );
    h.pipeline.stop();

    assert_eq!(h.sink.len(), 1, "watchdog stop emitted exactly one artifact");

    // Nothing else may appear after the deadline has long passed.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn unready_camera_skips_every_cycle() {
    let mut h = harness(false, Duration::from_secs(30), fast_config(true));

    h.script.push_person_batches(5, 0.9);
    h.pipeline.start().expect("start");
    std::thread::sleep(Duration::from_millis(300));
    h.pipeline.stop();

    assert_eq!(h.pipeline.completed_cycles(), 0, "no cycle ran");
    assert_eq!(h.controller.state(), RecorderState::Idle);
    assert!(h.sink.is_empty());
}

#[test]
fn overlay_surface_tracks_source_dimensions() {
    let mut h = harness(true, Duration::from_secs(30), fast_config(false));

    h.pipeline.start().expect("start");
    assert!(
        wait_until(Duration::from_secs(2), || {
            h.pipeline.completed_cycles() > 0
        }),
        "at least one cycle should complete"
    );
    h.pipeline.stop();

    let surface = h.pipeline.overlay_surface();
    let surface = surface.lock().expect("surface lock");
    assert_eq!((surface.width(), surface.height()), (64, 48));
}

#[test]
fn reconfiguration_restarts_sampling_cleanly() {
    let mut h = harness(true, Duration::from_secs(30), fast_config(false));

    h.pipeline.start().expect("start");
    assert!(wait_until(Duration::from_secs(2), || {
        h.pipeline.completed_cycles() > 0
    }));

    h.pipeline.set_mirrored(true).expect("set mirrored");
    h.pipeline.set_auto_record(true).expect("set auto record");
    assert!(h.pipeline.is_running(), "scheduler restarted after changes");

    let before = h.pipeline.completed_cycles();
    assert!(
        wait_until(Duration::from_secs(2), || {
            h.pipeline.completed_cycles() > before
        }),
        "cycles keep flowing after reconfiguration"
    );

    h.pipeline.stop();
    let notices = h.notifier.notices();
    assert!(notices.contains(&Notice::AutoRecordEnabled));
}
