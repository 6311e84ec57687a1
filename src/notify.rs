//! Notification and audible-cue boundaries.
//!
//! The pipeline emits discrete notices for an external presentation layer
//! (toasts, status line) and fires a short audible cue when auto-recording
//! kicks in. Both boundaries are fire-and-forget: the pipeline never blocks
//! on acknowledgment.

use std::fmt;
use std::sync::Mutex;

/// A discrete user-facing event.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    RecordingStarted,
    RecordingSaved { file_name: String },
    SaveFailed { file_name: String, reason: String },
    SnapshotSaved { file_name: String },
    CameraUnavailable,
    AutoRecordEnabled,
    AutoRecordDisabled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RecordingStarted => write!(f, "recording started"),
            Notice::RecordingSaved { file_name } => write!(f, "recording saved: {}", file_name),
            Notice::SaveFailed { file_name, reason } => {
                write!(f, "failed to save {}: {}", file_name, reason)
            }
            Notice::SnapshotSaved { file_name } => write!(f, "snapshot saved: {}", file_name),
            Notice::CameraUnavailable => write!(f, "camera unavailable"),
            Notice::AutoRecordEnabled => write!(f, "automatic recording enabled"),
            Notice::AutoRecordDisabled => write!(f, "automatic recording disabled"),
        }
    }
}

/// Notification boundary. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: routes notices to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::SaveFailed { .. } | Notice::CameraUnavailable => {
                log::warn!("{}", notice)
            }
            _ => log::info!("{}", notice),
        }
    }
}

/// In-memory notifier for tests.
#[derive(Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

/// Audible-cue boundary. `play_cue` is fire-and-forget.
pub trait CueSounder: Send + Sync {
    /// Play the cue at `volume` (already clamped to [0, 1] by callers).
    fn play_cue(&self, volume: f32);
}

/// Default cue: a log line standing in for the beep.
pub struct LogCue;

impl CueSounder for LogCue {
    fn play_cue(&self, volume: f32) {
        log::debug!("audible cue at volume {:.1}", volume);
    }
}

/// In-memory cue recorder for tests.
#[derive(Default)]
pub struct MemoryCue {
    played: Mutex<Vec<f32>>,
}

impl MemoryCue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<f32> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl CueSounder for MemoryCue {
    fn play_cue(&self, volume: f32) {
        if let Ok(mut played) = self.played.lock() {
            played.push(volume);
        }
    }
}

/// Clamp a notification volume into [0, 1]. Non-finite input maps to 0.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_clamped_to_unit_range() {
        assert_eq!(clamp_volume(0.5), 0.5);
        assert_eq!(clamp_volume(-1.0), 0.0);
        assert_eq!(clamp_volume(3.5), 1.0);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[test]
    fn memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::new();
        notifier.notify(Notice::RecordingStarted);
        notifier.notify(Notice::AutoRecordEnabled);
        assert_eq!(
            notifier.notices(),
            vec![Notice::RecordingStarted, Notice::AutoRecordEnabled]
        );
    }
}
