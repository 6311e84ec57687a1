//! Object detection boundary.
//!
//! The inference engine is a black box behind `DetectorBackend`: RGB frame
//! in, `DetectionBatch` out. Backends are registered by name and selected
//! through configuration. Inference latency is unbounded; the pipeline never
//! blocks a sampling tick on it.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::CpuBackend;
pub use backends::{StubBackend, StubScript};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, Detection, DetectionBatch, PERSON_LABEL};
