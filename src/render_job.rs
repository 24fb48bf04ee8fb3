//! Offline render job metadata.
//!
//! Each headless render writes a metadata file alongside the frames so a
//! sequence can be traced back to the exact inputs that produced it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Specification for one offline render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobSpec {
    /// Path to the analysis JSON driving the cue schedule.
    pub analysis_path: PathBuf,

    /// Optional cover image fed to the scenes.
    #[serde(default)]
    pub album_path: Option<PathBuf>,

    /// Output directory for frames.
    pub output_dir: PathBuf,

    pub fps: f32,

    /// Render duration in seconds. None means the full track.
    #[serde(default)]
    pub duration: Option<f32>,

    pub width: u32,
    pub height: u32,

    /// Output resolution scale factor.
    pub scale: f32,

    /// Composite mode string (`director`, `all`, `solo:<id>`).
    pub mode: String,

    /// Playback offset the simulation starts from, in milliseconds.
    #[serde(default)]
    pub seek_ms: u64,
}

/// Metadata written next to a finished frame sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub spec: RenderJobSpec,

    /// When the render completed.
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the analysis input, for reproducibility checks.
    pub analysis_sha256: String,

    /// Number of frames written.
    pub frames: usize,
}

impl RenderMetadata {
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Hex SHA-256 digest of a file's contents.
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_roundtrips_through_camel_case_json() {
        let spec = RenderJobSpec {
            analysis_path: PathBuf::from("analysis.json"),
            album_path: None,
            output_dir: PathBuf::from("frames"),
            fps: 60.0,
            duration: Some(12.0),
            width: 1280,
            height: 720,
            scale: 1.0,
            mode: "director".to_string(),
            seek_ms: 0,
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("analysisPath"));
        assert!(json.contains("seekMs"));
        let back: RenderJobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, 1280);
        assert_eq!(back.duration, Some(12.0));
    }

    #[test]
    fn digest_is_stable_hex() {
        let dir = std::env::temp_dir().join("pulsestage-digest-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.json");
        std::fs::write(&path, b"{}").unwrap();
        let digest = file_digest(&path).unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, file_digest(&path).unwrap());
    }
}
