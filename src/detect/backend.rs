use anyhow::Result;

use crate::detect::result::DetectionBatch;

/// Detector backend trait.
///
/// The inference engine behind this trait is a black box: image in, labeled
/// boxes out. Latency is model-dependent and unbounded in general, so callers
/// must never block a sampling tick on a `detect` call.
///
/// Failures are transient by contract (model not loaded yet, decode hiccup).
/// The pipeline treats a failed call as "no detections this cycle" and the
/// next tick retries naturally.
pub trait DetectorBackend: Send {
    /// Backend identifier, used for registry selection and logs.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    ///
    /// `pixels` is tightly packed RGB8 of `width * height * 3` bytes. The
    /// slice is read-only and must not be retained beyond this call.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionBatch>;

    /// Optional warm-up hook. Backends that load a model lazily should do it
    /// here so the first sampling cycle does not pay the load cost.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
