//! Recording state machine.
//!
//! The controller owns `RecorderState` and the single active session. All
//! transitions are serialized behind one mutex, so manual stop, auto-trigger
//! and watchdog fire are mutually exclusive. Other components only query
//! state and issue start/stop requests.
//!
//! Rules, in order of precedence:
//! - A start request while already recording is absorbed as a no-op: no
//!   second session, no second watchdog, no second cue.
//! - A manual stop always finalizes, regardless of how the session started.
//! - Every session that started yields exactly one finalized artifact, even
//!   when the sink fails (the failure is surfaced as a notice and the state
//!   still returns to Idle).
//! - Starting arms the watchdog exactly once; finalizing disarms it. A stale
//!   watchdog also carries its session sequence, so it can never fire
//!   against a later session.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::artifact::{Artifact, ArtifactKind, ArtifactSink};
use crate::frame::Frame;
use crate::notify::{clamp_volume, CueSounder, Notice, Notifier};

/// Default maximum recording duration before the watchdog forces a stop.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(30_000);
/// Default JPEG quality for recorded chunks.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Recorder states. Initial state is always `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Clone, Copy, Debug)]
enum StopReason {
    Manual,
    Watchdog,
}

/// One live capture. Created on Idle -> Recording, consumed on the way back.
struct RecordingSession {
    seq: u64,
    started_at: DateTime<Local>,
    started_instant: Instant,
    chunks: Vec<Vec<u8>>,
    byte_count: usize,
}

struct ControllerInner {
    state: RecorderState,
    session: Option<RecordingSession>,
    next_session_seq: u64,
    watchdog: Option<WatchdogHandle>,
}

/// Governs capture start/stop, the auto-trigger no-op debounce, and the
/// maximum-duration watchdog.
pub struct RecordingController {
    inner: Mutex<ControllerInner>,
    sink: Arc<dyn ArtifactSink>,
    notifier: Arc<dyn Notifier>,
    cue: Arc<dyn CueSounder>,
    max_duration: Duration,
    jpeg_quality: u8,
}

impl RecordingController {
    pub fn new(
        sink: Arc<dyn ArtifactSink>,
        notifier: Arc<dyn Notifier>,
        cue: Arc<dyn CueSounder>,
        max_duration: Duration,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            inner: Mutex::new(ControllerInner {
                state: RecorderState::Idle,
                session: None,
                next_session_seq: 1,
                watchdog: None,
            }),
            sink,
            notifier,
            cue,
            max_duration,
            jpeg_quality,
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, ControllerInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("recorder lock poisoned"))
    }

    pub fn state(&self) -> RecorderState {
        self.lock_inner()
            .map(|inner| inner.state)
            .unwrap_or(RecorderState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Start a recording. Returns false (and does nothing) when a session is
    /// already active. `with_cue` plays the audible cue first, at `volume`
    /// (clamped); the auto-trigger path sets it, the manual path does not.
    pub fn start(self: &Arc<Self>, with_cue: bool, volume: f32) -> Result<bool> {
        let mut inner = self.lock_inner()?;
        if inner.state == RecorderState::Recording {
            log::debug!("start request absorbed: already recording");
            return Ok(false);
        }

        if with_cue {
            self.cue.play_cue(clamp_volume(volume));
        }

        let seq = inner.next_session_seq;
        inner.next_session_seq += 1;
        inner.session = Some(RecordingSession {
            seq,
            started_at: Local::now(),
            started_instant: Instant::now(),
            chunks: Vec::new(),
            byte_count: 0,
        });
        inner.state = RecorderState::Recording;
        inner.watchdog = Some(self.arm_watchdog(seq));

        log::info!(
            "recording started (session {}, max {:.0}s)",
            seq,
            self.max_duration.as_secs_f32()
        );
        Ok(true)
    }

    /// Manual stop: finalize the active session and emit its artifact.
    /// Returns the artifact file name, or None when idle (stop on an idle
    /// recorder is a no-op, not an error).
    pub fn stop(&self) -> Result<Option<String>> {
        let mut inner = self.lock_inner()?;
        if inner.state != RecorderState::Recording {
            return Ok(None);
        }
        let file_name = self.finalize_locked(&mut inner, StopReason::Manual)?;
        Ok(Some(file_name))
    }

    /// Append one frame to the active session. No-op when idle.
    pub fn record_frame(&self, frame: &Frame) -> Result<()> {
        let mut inner = self.lock_inner()?;
        if inner.state != RecorderState::Recording {
            return Ok(());
        }
        let chunk = encode_chunk(frame, self.jpeg_quality)?;
        if let Some(session) = inner.session.as_mut() {
            session.byte_count += chunk.len();
            session.chunks.push(chunk);
        }
        Ok(())
    }

    /// Watchdog fire path. The session sequence guards against a stale
    /// watchdog reaching a later session.
    fn expire(&self, seq: u64) {
        let Ok(mut inner) = self.lock_inner() else {
            log::error!("recorder lock poisoned; watchdog stop skipped");
            return;
        };
        let active = inner.session.as_ref().map(|s| s.seq);
        if inner.state != RecorderState::Recording || active != Some(seq) {
            log::debug!("stale watchdog for session {} ignored", seq);
            return;
        }
        log::info!("recording reached maximum duration; stopping");
        if let Err(e) = self.finalize_locked(&mut inner, StopReason::Watchdog) {
            log::error!("watchdog finalize failed: {:#}", e);
        }
    }

    /// Finalize the active session: exactly one artifact out, state back to
    /// Idle, watchdog disarmed. Called with the state lock held.
    fn finalize_locked(
        &self,
        inner: &mut ControllerInner,
        reason: StopReason,
    ) -> Result<String> {
        let session = inner
            .session
            .take()
            .ok_or_else(|| anyhow!("recording state without a session"))?;
        inner.state = RecorderState::Idle;
        if let Some(watchdog) = inner.watchdog.take() {
            watchdog.disarm();
        }

        let duration = session.started_instant.elapsed();
        let mut bytes = Vec::with_capacity(session.byte_count);
        let chunk_count = session.chunks.len();
        for chunk in session.chunks {
            bytes.extend_from_slice(&chunk);
        }

        let artifact = Artifact::captured_at(ArtifactKind::Clip, session.started_at, bytes);
        let file_name = artifact.file_name.clone();
        log::info!(
            "recording stopped ({:?}) after {:.1}s: {} chunks, {} bytes",
            reason,
            duration.as_secs_f32(),
            chunk_count,
            artifact.bytes.len()
        );

        match self.sink.store(&artifact) {
            Ok(()) => self.notifier.notify(Notice::RecordingSaved {
                file_name: file_name.clone(),
            }),
            Err(e) => {
                log::error!("failed to store recording {}: {:#}", file_name, e);
                self.notifier.notify(Notice::SaveFailed {
                    file_name: file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(file_name)
    }

    fn arm_watchdog(self: &Arc<Self>, seq: u64) -> WatchdogHandle {
        let cancel = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_cancel = Arc::clone(&cancel);
        let controller = Arc::clone(self);
        let max_duration = self.max_duration;

        std::thread::spawn(move || {
            let (lock, cvar) = &*thread_cancel;
            let deadline = Instant::now() + max_duration;
            let Ok(mut cancelled) = lock.lock() else {
                return;
            };
            while !*cancelled {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let Ok((guard, _)) = cvar.wait_timeout(cancelled, deadline - now) else {
                    return;
                };
                cancelled = guard;
            }
            let fire = !*cancelled;
            drop(cancelled);
            if fire {
                controller.expire(seq);
            }
        });

        WatchdogHandle { cancel }
    }
}

/// Owned handle to an armed watchdog timer. Disarming wakes the timer thread
/// so it exits without firing; the thread itself is detached.
struct WatchdogHandle {
    cancel: Arc<(Mutex<bool>, Condvar)>,
}

impl WatchdogHandle {
    fn disarm(&self) {
        let (lock, cvar) = &*self.cancel;
        if let Ok(mut cancelled) = lock.lock() {
            *cancelled = true;
        }
        cvar.notify_all();
    }
}

fn encode_chunk(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .context("failed to encode recording chunk")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemorySink;
    use crate::notify::{MemoryCue, MemoryNotifier};

    struct FailingSink;

    impl ArtifactSink for FailingSink {
        fn store(&self, _artifact: &Artifact) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    struct Harness {
        controller: Arc<RecordingController>,
        sink: Arc<MemorySink>,
        notifier: Arc<MemoryNotifier>,
        cue: Arc<MemoryCue>,
    }

    fn harness(max_duration: Duration) -> Harness {
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
        Harness {
            controller,
            sink,
            notifier,
            cue,
        }
    }

    fn test_frame() -> Frame {
        Frame::new(vec![128u8; 16 * 12 * 3], 16, 12, 1)
    }

    #[test]
    fn initial_state_is_idle() {
        let h = harness(DEFAULT_MAX_DURATION);
        assert_eq!(h.controller.state(), RecorderState::Idle);
        assert_eq!(h.controller.stop().unwrap(), None);
    }

    #[test]
    fn reentrant_starts_keep_one_session_and_one_cue() {
        let h = harness(DEFAULT_MAX_DURATION);

        assert!(h.controller.start(true, 0.8).unwrap());
        assert!(!h.controller.start(true, 0.8).unwrap());
        assert!(!h.controller.start(false, 0.8).unwrap());

        assert_eq!(h.cue.played(), vec![0.8]);
        assert!(h.controller.is_recording());

        h.controller.stop().unwrap();
        assert_eq!(h.sink.len(), 1, "one session, one artifact");
    }

    #[test]
    fn manual_start_skips_the_cue() {
        let h = harness(DEFAULT_MAX_DURATION);
        assert!(h.controller.start(false, 0.8).unwrap());
        assert!(h.cue.played().is_empty());
        h.controller.stop().unwrap();
    }

    #[test]
    fn cue_volume_is_clamped() {
        let h = harness(DEFAULT_MAX_DURATION);
        h.controller.start(true, 7.0).unwrap();
        assert_eq!(h.cue.played(), vec![1.0]);
        h.controller.stop().unwrap();
    }

    #[test]
    fn manual_stop_emits_exactly_one_artifact() {
        let h = harness(DEFAULT_MAX_DURATION);
        h.controller.start(false, 0.5).unwrap();
        h.controller.record_frame(&test_frame()).unwrap();
        h.controller.record_frame(&test_frame()).unwrap();

        let file_name = h.controller.stop().unwrap().expect("file name");
        assert!(file_name.ends_with(".mjpeg"));
        assert_eq!(h.controller.state(), RecorderState::Idle);

        let artifacts = h.sink.artifacts();
        assert_eq!(artifacts.len(), 1);
        // Two JPEG chunks, so the blob starts with a JPEG SOI marker.
        assert_eq!(&artifacts[0].bytes[..2], &[0xff, 0xd8]);

        let notices = h.notifier.notices();
        assert!(notices
            .iter()
            .any(|n| matches!(n, Notice::RecordingSaved { .. })));
    }

    #[test]
    fn frames_are_ignored_while_idle() {
        let h = harness(DEFAULT_MAX_DURATION);
        h.controller.record_frame(&test_frame()).unwrap();
        h.controller.start(false, 0.5).unwrap();
        let file_name = h.controller.stop().unwrap().expect("file name");
        assert!(file_name.ends_with(".mjpeg"));
        let artifacts = h.sink.artifacts();
        assert!(artifacts[0].bytes.is_empty(), "no chunks were recorded");
    }

    #[test]
    fn watchdog_forces_a_stop_with_one_artifact() {
        let h = harness(Duration::from_millis(60));
        h.controller.start(true, 0.5).unwrap();

        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(h.controller.state(), RecorderState::Idle);
        assert_eq!(h.sink.len(), 1);
    }

    #[test]
    fn manual_stop_disarms_the_watchdog() {
        let h = harness(Duration::from_millis(120));
        h.controller.start(false, 0.5).unwrap();
        h.controller.stop().unwrap();
        assert_eq!(h.sink.len(), 1);

        // Past the watchdog deadline: no second artifact may appear.
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(h.sink.len(), 1);
        assert_eq!(h.controller.state(), RecorderState::Idle);
    }

    #[test]
    fn stale_watchdog_never_touches_a_later_session() {
        let h = harness(Duration::from_millis(100));
        h.controller.start(false, 0.5).unwrap();
        h.controller.stop().unwrap();

        // Second session started inside the first watchdog's window.
        h.controller.start(false, 0.5).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(
            h.controller.is_recording(),
            "first session's watchdog must not stop the second session"
        );

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(h.controller.state(), RecorderState::Idle);
        assert_eq!(h.sink.len(), 2);
    }

    #[test]
    fn sink_failure_still_returns_to_idle() {
        let notifier = Arc::new(MemoryNotifier::new());
        let controller = Arc::new(RecordingController::new(
            Arc::new(FailingSink),
            notifier.clone(),
            Arc::new(MemoryCue::new()),
            DEFAULT_MAX_DURATION,
            DEFAULT_JPEG_QUALITY,
        ));

        controller.start(false, 0.5).unwrap();
        let file_name = controller.stop().unwrap();
        assert!(file_name.is_some(), "finalize still names the artifact");
        assert_eq!(controller.state(), RecorderState::Idle);

        let notices = notifier.notices();
        assert!(notices
            .iter()
            .any(|n| matches!(n, Notice::SaveFailed { .. })));
    }
}
