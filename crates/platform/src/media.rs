//! Guards for operator-supplied media paths and the voice-note analyzer seam.

use std::path::{Component, Path, PathBuf};

/// Duration and synthetic waveform for a voice note, produced by an external
/// analyzer. The waveform is always exactly 64 bytes.
#[derive(Debug, Clone)]
pub struct VoiceNoteMeta {
    pub duration_seconds: u32,
    pub waveform: [u8; 64],
}

/// Contract for the external audio analyzer: bytes in, duration and a
/// 64-byte waveform out.
pub trait AudioAnalyzer: Send + Sync {
    fn analyze(
        &self,
        bytes: &[u8],
    ) -> Result<VoiceNoteMeta, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The raw path contains a parent-directory component. Rejected before
    /// any filesystem access, even with the allow-list disabled.
    #[error("path contains a parent-directory component: {path}")]
    Traversal { path: String },

    #[error("path is outside the allowed media roots: {path}")]
    OutsideRoots { path: String },

    #[error("path cannot be resolved: {path}")]
    Unresolvable { path: String },
}

/// Validates operator-supplied filesystem paths before they are read as
/// outbound media.
#[derive(Debug, Clone)]
pub struct MediaPathGuard {
    roots: Vec<PathBuf>,
    enforce_roots: bool,
}

impl MediaPathGuard {
    /// `enforce_roots = false` skips the allow-list (the `DISABLE_PATH_CHECK`
    /// escape hatch); the traversal check always runs.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, enforce_roots: bool) -> Self {
        Self {
            roots,
            enforce_roots,
        }
    }

    /// Check a raw path and return its canonical form.
    pub fn check(&self, raw: &str) -> Result<PathBuf, PathError> {
        // A `..` component is traversal; a filename that merely contains
        // two dots is not.
        if Path::new(raw)
            .components()
            .any(|part| part == Component::ParentDir)
        {
            return Err(PathError::Traversal {
                path: raw.to_string(),
            });
        }

        let canonical = std::fs::canonicalize(raw).map_err(|_| PathError::Unresolvable {
            path: raw.to_string(),
        })?;

        if self.enforce_roots && !self.roots.iter().any(|root| canonical.starts_with(root)) {
            return Err(PathError::OutsideRoots {
                path: raw.to_string(),
            });
        }

        Ok(canonical)
    }
}

/// Classify a file for outbound sending by its extension. Anything
/// unrecognized ships as a document.
#[must_use]
pub fn media_kind_for_path(path: &Path) -> hermod_common::types::MediaKind {
    use hermod_common::types::MediaKind;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "webp" | "gif" => MediaKind::Image,
        "mp4" | "mov" | "mkv" | "webm" => MediaKind::Video,
        "ogg" | "opus" | "mp3" | "m4a" | "wav" => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}

/// MIME type for an outbound file, keyed by extension.
#[must_use]
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "ogg" | "opus" => "audio/ogg; codecs=opus",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
