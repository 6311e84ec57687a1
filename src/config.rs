//! Daemon configuration.
//!
//! Configuration is layered: JSON config file (path in `GUARDCAM_CONFIG`),
//! then environment overrides, then validation. Defaults preserve the
//! original tuning: 100 ms sampling cadence, 30 000 ms watchdog, volume 0.8.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CameraConfig;
use crate::pipeline::PipelineConfig;

const DEFAULT_CAMERA_URL: &str = "stub://webcam";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CADENCE_MS: u64 = 100;
const DEFAULT_VOLUME: f32 = 0.8;
const DEFAULT_MAX_RECORDING_MS: u64 = 30_000;
const DEFAULT_OUTPUT_DIR: &str = "recordings";
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_BACKEND: &str = "cpu";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
struct GuardcamConfigFile {
    camera: Option<CameraConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    recording: Option<RecordingConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    cadence_ms: Option<u64>,
    mirrored: Option<bool>,
    auto_record: Option<bool>,
    volume: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    max_duration_ms: Option<u64>,
    output_dir: Option<PathBuf>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    min_confidence: Option<f32>,
    font_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GuardcamConfig {
    pub camera: CameraSettings,
    pub pipeline: PipelineSettings,
    pub recording: RecordingSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cadence: Duration,
    pub mirrored: bool,
    pub auto_record: bool,
    pub volume: f32,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub max_duration: Duration,
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub min_confidence: f32,
    pub font_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
}

impl GuardcamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUARDCAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardcamConfigFile) -> Self {
        let camera = CameraSettings {
            url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let pipeline = PipelineSettings {
            cadence: Duration::from_millis(
                file.pipeline
                    .as_ref()
                    .and_then(|pipeline| pipeline.cadence_ms)
                    .unwrap_or(DEFAULT_CADENCE_MS),
            ),
            mirrored: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.mirrored)
                .unwrap_or(false),
            auto_record: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.auto_record)
                .unwrap_or(false),
            volume: file
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.volume)
                .unwrap_or(DEFAULT_VOLUME),
        };
        let recording = RecordingSettings {
            max_duration: Duration::from_millis(
                file.recording
                    .as_ref()
                    .and_then(|recording| recording.max_duration_ms)
                    .unwrap_or(DEFAULT_MAX_RECORDING_MS),
            ),
            output_dir: file
                .recording
                .as_ref()
                .and_then(|recording| recording.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            jpeg_quality: file
                .recording
                .as_ref()
                .and_then(|recording| recording.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            min_confidence: file
                .detector
                .as_ref()
                .and_then(|detector| detector.min_confidence)
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            font_path: file
                .detector
                .as_ref()
                .and_then(|detector| detector.font_path.clone()),
            model_path: file.detector.and_then(|detector| detector.model_path),
        };
        Self {
            camera,
            pipeline,
            recording,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GUARDCAM_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(dir) = std::env::var("GUARDCAM_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.recording.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("GUARDCAM_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(auto) = std::env::var("GUARDCAM_AUTO_RECORD") {
            self.pipeline.auto_record = parse_bool("GUARDCAM_AUTO_RECORD", &auto)?;
        }
        if let Ok(cadence) = std::env::var("GUARDCAM_CADENCE_MS") {
            let ms: u64 = cadence.parse().map_err(|_| {
                anyhow!("GUARDCAM_CADENCE_MS must be an integer number of milliseconds")
            })?;
            self.pipeline.cadence = Duration::from_millis(ms);
        }
        if let Ok(max) = std::env::var("GUARDCAM_MAX_RECORDING_MS") {
            let ms: u64 = max.parse().map_err(|_| {
                anyhow!("GUARDCAM_MAX_RECORDING_MS must be an integer number of milliseconds")
            })?;
            self.recording.max_duration = Duration::from_millis(ms);
        }
        if let Ok(volume) = std::env::var("GUARDCAM_VOLUME") {
            let volume: f32 = volume
                .parse()
                .map_err(|_| anyhow!("GUARDCAM_VOLUME must be a number in [0, 1]"))?;
            self.pipeline.volume = volume;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.pipeline.cadence.is_zero() {
            return Err(anyhow!("sampling cadence must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.pipeline.volume) {
            return Err(anyhow!("volume must be within [0, 1]"));
        }
        if self.recording.max_duration.is_zero() {
            return Err(anyhow!("max recording duration must be greater than zero"));
        }
        if self.recording.jpeg_quality == 0 || self.recording.jpeg_quality > 100 {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!("min confidence must be within [0, 1]"));
        }
        Ok(())
    }

    /// Camera layer view of this config.
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            url: self.camera.url.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
        }
    }

    /// Pipeline layer view of this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mirrored: self.pipeline.mirrored,
            auto_record: self.pipeline.auto_record,
            volume: self.pipeline.volume,
            cadence: self.pipeline.cadence,
        }
    }
}

fn read_config_file(path: &Path) -> Result<GuardcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", name)),
    }
}
