//! Camera frame source.
//!
//! `CameraSource` produces `Frame` instances for the sampling pipeline:
//! - Synthetic source (`stub://` URLs) for tests and demos
//! - GStreamer appsink decode for real devices/streams (feature: camera-gstreamer)
//!
//! The source exposes readiness and raw pixel dimensions so the coordinator
//! can skip a cycle instead of sampling an unready device. Readiness is the
//! caller's guard: `next_frame` on an unready source is an error, not a
//! blocking wait.

#[cfg(feature = "camera-gstreamer")]
use anyhow::Context;
use anyhow::{anyhow, Result};
#[cfg(feature = "camera-gstreamer")]
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device or stream URL (e.g. "rtsp://192.168.1.20:554/stream").
    /// "stub://" URLs select the synthetic source.
    pub url: String,
    /// Target frame rate (frames per second). The source decimates to this.
    pub target_fps: u32,
    /// Frame width (synthetic source; real sources report their own).
    pub width: u32,
    /// Frame height (synthetic source; real sources report their own).
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://webcam".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "camera-gstreamer")]
    Gstreamer(GstreamerCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            })
        } else {
            #[cfg(feature = "camera-gstreamer")]
            {
                Ok(Self {
                    backend: CameraBackend::Gstreamer(GstreamerCamera::new(config)?),
                })
            }
            #[cfg(not(feature = "camera-gstreamer"))]
            {
                anyhow::bail!("camera URLs require the camera-gstreamer feature")
            }
        }
    }

    /// Open the device / start the stream.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.connect(),
        }
    }

    /// True when the source has enough buffered data for a capture.
    ///
    /// The coordinator checks this before every cycle and drops the tick
    /// (never queues it) when false.
    pub fn ready(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.ready(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.ready(),
        }
    }

    /// Current source dimensions. Zero before the first frame on real
    /// devices; callers must treat zero as unready.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.dimensions(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.dimensions(),
        }
    }

    /// Capture the next frame. Precondition: `ready()` returned true.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_healthy(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.is_healthy(),
        }
    }

    /// Get capture statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "camera-gstreamer")]
            CameraBackend::Gstreamer(camera) => camera.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn ready(&self) -> bool {
        self.connected && self.config.width > 0 && self.config.height > 0
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.ready() {
            return Err(anyhow!("synthetic camera is not connected"));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Ok(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        ))
    }

    /// Generate synthetic pixel data: a static gradient background with a
    /// bright block that wanders across the scene, plus light speckle noise,
    /// so motion-based backends have something to chew on.
    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let mut pixels = vec![0u8; Frame::expected_len(width, height)];

        for y in 0..height {
            for x in 0..width {
                let idx = ((y * width + x) * 3) as usize;
                let shade = ((x + y) % 64) as u8 + 32;
                pixels[idx] = shade;
                pixels[idx + 1] = shade;
                pixels[idx + 2] = shade;
            }
        }

        // Wandering block, one block-width step every 10 frames.
        let block = (width / 8).max(1);
        let steps = (width / block).max(1) as u64;
        let block_x = ((self.frame_count / 10) % steps) as u32 * block;
        for y in height / 3..(height / 3 + block).min(height) {
            for x in block_x..(block_x + block).min(width) {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx] = 230;
                pixels[idx + 1] = 220;
                pixels[idx + 2] = 40;
            }
        }

        for _ in 0..(width as usize / 4) {
            let x = rand::random::<u32>() % width;
            let y = rand::random::<u32>() % height;
            let idx = ((y * width + x) * 3) as usize;
            pixels[idx] = pixels[idx].wrapping_add(rand::random::<u8>() % 16);
        }

        pixels
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// GStreamer camera for real devices/streams
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-gstreamer")]
struct GstreamerCamera {
    config: CameraConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    dimensions: (u32, u32),
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
}

#[cfg(feature = "camera-gstreamer")]
impl GstreamerCamera {
    /// Build the decode pipeline: source ! decodebin ! videoconvert ! appsink,
    /// RGB output, newest-buffer-wins (max-buffers=1, drop=true) so a slow
    /// consumer sees fresh frames rather than a backlog.
    fn new(config: CameraConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "uridecodebin uri={} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.url
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .context("build camera pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("camera pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            dimensions: (0, 0),
            last_frame_at: None,
            connected_at: None,
            last_error: None,
        })
    }

    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set camera pipeline to Playing")?;
        self.connected_at = Some(Instant::now());
        log::info!("CameraSource: connected to {}", self.config.url);
        Ok(())
    }

    fn ready(&self) -> bool {
        self.connected_at.is_some() && self.last_error.is_none()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.poll_bus();
        if let Some(error) = &self.last_error {
            return Err(anyhow!("camera stream failed: {}", error));
        }

        let timeout = self.frame_timeout();
        let sample = self
            .appsink
            .try_pull_sample(timeout)
            .context("pull camera sample")?
            .ok_or_else(|| anyhow!("camera stream stalled"))?;

        let (pixels, width, height) = sample_to_pixels(&sample)?;

        self.frame_count += 1;
        self.dimensions = (width, height);
        self.last_frame_at = Some(Instant::now());

        Ok(Frame::new(pixels, width, height, self.frame_count))
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(Duration::from_millis(0)) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

#[cfg(feature = "camera-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("camera sample missing buffer")?;
    let caps = sample.caps().context("camera sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse camera caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride(0) as usize;

    let map = buffer.map_readable().context("map camera buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("camera buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            url: "stub://test".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn camera_is_unready_before_connect() {
        let camera = CameraSource::new(stub_config()).unwrap();
        assert!(!camera.ready());
        assert!(!camera.is_healthy());
    }

    #[test]
    fn camera_produces_full_frames_after_connect() {
        let mut camera = CameraSource::new(stub_config()).unwrap();
        camera.connect().unwrap();
        assert!(camera.ready());

        let frame = camera.next_frame().unwrap();
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert!(frame.is_ready());
        assert_eq!(frame.seq, 1);
    }

    #[test]
    fn capture_stats_count_frames() {
        let mut camera = CameraSource::new(stub_config()).unwrap();
        camera.connect().unwrap();
        camera.next_frame().unwrap();
        camera.next_frame().unwrap();

        let stats = camera.stats();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.url, "stub://test");
    }

    #[test]
    fn synthetic_scene_changes_over_time() {
        let mut camera = CameraSource::new(stub_config()).unwrap();
        camera.connect().unwrap();

        let first = camera.next_frame().unwrap();
        let mut changed = false;
        for _ in 0..30 {
            let frame = camera.next_frame().unwrap();
            if frame.pixels != first.pixels {
                changed = true;
                break;
            }
        }
        assert!(changed, "synthetic scene should not be static");
    }
}
