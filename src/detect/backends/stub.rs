use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionBatch, PERSON_LABEL};

/// Stub backend for tests and demos.
///
/// Scripted batches are returned in push order, one per cycle. Once the
/// script runs dry the backend falls back to pixel hashing: a frame that
/// differs from the previous one yields a single full-frame "motion" box.
pub struct StubBackend {
    script: Arc<Mutex<VecDeque<DetectionBatch>>>,
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            last_hash: None,
        }
    }

    /// Queue a batch to be returned by the next unscripted `detect` call.
    pub fn push_batch(&self, batch: DetectionBatch) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(batch);
        }
    }

    /// Queue `count` copies of a single-person batch.
    pub fn push_person_batches(&self, count: usize, confidence: f32) {
        for _ in 0..count {
            self.push_batch(DetectionBatch::new(vec![Detection::new(
                PERSON_LABEL,
                confidence,
                BoundingBox::new(120.0, 80.0, 160.0, 320.0),
            )]));
        }
    }

    /// Handle for scripting batches after the backend has been registered.
    pub fn script_handle(&self) -> StubScript {
        StubScript {
            script: Arc::clone(&self.script),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that feeds a registered `StubBackend`.
#[derive(Clone)]
pub struct StubScript {
    script: Arc<Mutex<VecDeque<DetectionBatch>>>,
}

impl StubScript {
    pub fn push_batch(&self, batch: DetectionBatch) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(batch);
        }
    }

    pub fn push_person_batches(&self, count: usize, confidence: f32) {
        for _ in 0..count {
            self.push_batch(DetectionBatch::new(vec![Detection::new(
                PERSON_LABEL,
                confidence,
                BoundingBox::new(120.0, 80.0, 160.0, 320.0),
            )]));
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionBatch> {
        if let Ok(mut script) = self.script.lock() {
            if let Some(batch) = script.pop_front() {
                return Ok(batch);
            }
        }

        let current_hash: [u8; 32] = Sha256::digest(pixels).into();
        let motion = self.last_hash.is_some_and(|prev| prev != current_hash);
        self.last_hash = Some(current_hash);

        if motion {
            Ok(DetectionBatch::new(vec![Detection::new(
                "motion",
                0.85,
                BoundingBox::new(0.0, 0.0, width as f32, height as f32),
            )]))
        } else {
            Ok(DetectionBatch::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_batches_come_back_in_order() {
        let mut backend = StubBackend::new();
        backend.push_person_batches(1, 0.9);
        backend.push_batch(DetectionBatch::default());

        let first = backend.detect(b"frame", 10, 10).unwrap();
        assert!(first.contains_person());

        let second = backend.detect(b"frame", 10, 10).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn fallback_reports_motion_on_changed_pixels() {
        let mut backend = StubBackend::new();

        let r1 = backend.detect(b"frame1", 10, 10).unwrap();
        assert!(r1.is_empty());

        let r2 = backend.detect(b"frame2", 10, 10).unwrap();
        assert!(r2.contains_label("motion"));
        assert!(!r2.contains_person());

        let r3 = backend.detect(b"frame2", 10, 10).unwrap();
        assert!(r3.is_empty());
    }

    #[test]
    fn script_handle_feeds_a_running_backend() {
        let mut backend = StubBackend::new();
        let script = backend.script_handle();
        script.push_person_batches(1, 0.8);

        let batch = backend.detect(b"frame", 10, 10).unwrap();
        assert!(batch.contains_person());
    }
}
