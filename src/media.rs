//! Source media handles
//!
//! A session analyzes exactly one piece of media at a time: either a file the
//! user picked or an artifact produced by the webcam recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Where the bytes of a media handle live
#[derive(Debug, Clone)]
pub enum MediaData {
    /// A file on disk, read lazily at upload time
    File(PathBuf),
    /// An in-memory recording
    Memory(Arc<Vec<u8>>),
}

/// A video ready to be analyzed
#[derive(Debug, Clone)]
pub struct SourceMedia {
    /// File name sent with the multipart upload
    pub name: String,

    /// MIME type of the media
    pub mime_type: String,

    /// Displayable URL (`file://` for files, `blob:` for recordings)
    pub url: String,

    /// Backing data
    pub data: MediaData,
}

impl SourceMedia {
    /// Media backed by a user-selected file.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let encoded: Vec<String> = absolute
            .to_string_lossy()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        Self {
            name,
            mime_type: mime_type_for(path),
            url: format!("file://{}", encoded.join("/")),
            data: MediaData::File(path.to_path_buf()),
        }
    }

    /// Media backed by a finished webcam recording.
    pub fn from_artifact(artifact: &MediaArtifact) -> Self {
        Self {
            name: artifact.file_name.clone(),
            mime_type: artifact.mime_type.clone(),
            url: format!("blob:posture-coach/{}", artifact.id),
            data: MediaData::Memory(artifact.data.clone()),
        }
    }

    /// `type/subtype` without parameters, e.g. `video/webm` for
    /// `video/webm;codecs=vp8,opus`.
    pub fn mime_essence(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or(&self.mime_type)
    }

    /// Whether this media came from the recorder.
    pub fn is_recording(&self) -> bool {
        matches!(self.data, MediaData::Memory(_))
    }

    /// Read the full media payload.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            MediaData::File(path) => tokio::fs::read(path).await,
            MediaData::Memory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    /// Serializable description for the presentation layer
    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            url: self.url.clone(),
            recorded: self.is_recording(),
        }
    }
}

/// Presentation-facing view of [`SourceMedia`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub name: String,
    pub mime_type: String,
    pub url: String,
    pub recorded: bool,
}

/// Finished output of the webcam recorder
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    /// Unique artifact ID
    pub id: Uuid,

    /// File name used when uploading or saving
    pub file_name: String,

    /// Container MIME type chosen by the recorder
    pub mime_type: String,

    /// Encoded bytes
    pub data: Arc<Vec<u8>>,

    /// Wall-clock recording duration
    pub duration: Duration,

    /// When recording started
    pub recorded_at: DateTime<Utc>,
}

impl MediaArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the artifact into `dir`, returning the written path.
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stem = self.recorded_at.format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("{}-{}", stem, self.file_name));
        std::fs::write(&path, self.data.as_slice())?;
        tracing::info!("Saved recording ({} bytes) to {:?}", self.len(), path);
        Ok(path)
    }
}

fn mime_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
