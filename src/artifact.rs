//! Persistence boundary.
//!
//! A finalized recording or snapshot leaves the pipeline as an `Artifact`:
//! a named blob handed to an `ArtifactSink`. The pipeline does not manage
//! storage lifecycle beyond producing the artifact.
//!
//! File names are the formatted capture timestamp plus the kind's extension,
//! e.g. `08-06-2026 14-03-59.mjpeg`.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

/// What kind of media an artifact carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A finished recording: concatenated JPEG frames (MJPEG).
    Clip,
    /// A single-frame snapshot (PNG).
    Snapshot,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Clip => "mjpeg",
            ArtifactKind::Snapshot => "png",
        }
    }
}

/// A named media blob ready for download/storage.
#[derive(Clone, Debug)]
pub struct Artifact {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Build an artifact named after its capture timestamp.
    pub fn captured_at(kind: ArtifactKind, at: DateTime<Local>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: format!("{}.{}", format_capture_timestamp(&at), kind.extension()),
            kind,
            bytes,
        }
    }
}

/// Format a capture timestamp for artifact file names: `MM-DD-YYYY HH-MM-SS`.
pub fn format_capture_timestamp(at: &DateTime<Local>) -> String {
    at.format("%m-%d-%Y %H-%M-%S").to_string()
}

/// Artifact consumer. Implementations own the storage lifecycle.
pub trait ArtifactSink: Send + Sync {
    fn store(&self, artifact: &Artifact) -> Result<()>;
}

/// Writes artifacts into a directory.
pub struct FilesystemSink {
    dir: PathBuf,
}

impl FilesystemSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl ArtifactSink for FilesystemSink {
    fn store(&self, artifact: &Artifact) -> Result<()> {
        let path = self.dir.join(&artifact.file_name);
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;
        log::debug!(
            "stored {:?} artifact {} ({} bytes)",
            artifact.kind,
            path.display(),
            artifact.bytes.len()
        );
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactSink for MemorySink {
    fn store(&self, artifact: &Artifact) -> Result<()> {
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.push(artifact.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn capture_timestamp_matches_download_format() {
        let at = Local
            .with_ymd_and_hms(2026, 8, 6, 14, 3, 59)
            .single()
            .expect("unambiguous local time");
        assert_eq!(format_capture_timestamp(&at), "08-06-2026 14-03-59");
    }

    #[test]
    fn artifact_name_carries_kind_extension() {
        let at = Local
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .expect("unambiguous local time");
        let clip = Artifact::captured_at(ArtifactKind::Clip, at, vec![1, 2, 3]);
        assert_eq!(clip.file_name, "01-02-2026 03-04-05.mjpeg");

        let shot = Artifact::captured_at(ArtifactKind::Snapshot, at, vec![]);
        assert_eq!(shot.file_name, "01-02-2026 03-04-05.png");
    }

    #[test]
    fn filesystem_sink_writes_the_blob() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FilesystemSink::new(dir.path()).expect("sink");

        let artifact = Artifact {
            file_name: "clip.mjpeg".to_string(),
            kind: ArtifactKind::Clip,
            bytes: vec![0xde, 0xad],
        };
        sink.store(&artifact).expect("store");

        let written = std::fs::read(dir.path().join("clip.mjpeg")).expect("read back");
        assert_eq!(written, vec![0xde, 0xad]);
    }

    #[test]
    fn memory_sink_accumulates() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.store(&Artifact {
            file_name: "a.png".into(),
            kind: ArtifactKind::Snapshot,
            bytes: vec![],
        })
        .unwrap();
        assert_eq!(sink.len(), 1);
    }
}
