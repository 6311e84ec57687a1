//! GuardCam
//!
//! A person-triggered camera recorder: frames are sampled from a live video
//! source at a fixed cadence, each sample runs through an object detector,
//! and the results drive an annotated overlay plus a recording state machine
//! that starts automatically when a person is in frame and stops on manual
//! request or after a bounded duration.
//!
//! # Architecture
//!
//! - `capture`: camera frame sources (synthetic `stub://`, GStreamer)
//! - `detect`: detector backends behind a black-box inference trait
//! - `overlay`: annotated overlay rendering (boxes + labels)
//! - `schedule`: the fixed-cadence sampling scheduler
//! - `record`: the Idle/Recording state machine with its watchdog
//! - `pipeline`: the coordinator wiring everything per tick
//! - `artifact`, `notify`: persistence and notification boundaries
//! - `config`: layered daemon configuration
//!
//! The design favors freshness over completeness: a tick that finds the
//! camera unready or inference still in flight is dropped, never queued.

pub mod artifact;
pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod record;
pub mod schedule;

pub use artifact::{Artifact, ArtifactKind, ArtifactSink, FilesystemSink, MemorySink};
pub use capture::{CameraConfig, CameraSource, CameraStats};
pub use config::GuardcamConfig;
pub use detect::{
    BackendRegistry, BoundingBox, CpuBackend, Detection, DetectionBatch, DetectorBackend,
    SharedBackend, StubBackend, StubScript, PERSON_LABEL,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use notify::{
    clamp_volume, CueSounder, LogCue, LogNotifier, MemoryCue, MemoryNotifier, Notice, Notifier,
};
pub use overlay::{OverlayRenderer, OverlaySurface};
pub use pipeline::{Pipeline, PipelineConfig, PipelineDeps, DEFAULT_VOLUME};
pub use record::{
    RecorderState, RecordingController, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DURATION,
};
pub use schedule::{SamplingScheduler, DEFAULT_CADENCE};
