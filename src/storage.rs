// SPDX-License-Identifier: MPL-2.0

//! Media library for finished photos and videos

use crate::constants::files;
use crate::errors::{PhotoError, RecordingError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Destination for captured media
///
/// Imports are called from worker threads, never from the session queue.
pub trait MediaLibrary: Send + Sync {
    /// Store an encoded still, moving an optional paired movie alongside it
    fn import_photo(
        &self,
        data: &[u8],
        extension: &str,
        paired_movie: Option<&Path>,
    ) -> Result<PathBuf, PhotoError>;

    /// Move a finished recording into the library
    fn import_video(&self, source: &Path) -> Result<PathBuf, RecordingError>;
}

/// Library backed by the user's Pictures and Videos folders
#[derive(Debug, Clone)]
pub struct DirectoryMediaLibrary {
    photo_dir: PathBuf,
    video_dir: PathBuf,
}

impl DirectoryMediaLibrary {
    pub fn new(photo_dir: PathBuf, video_dir: PathBuf) -> Self {
        Self {
            photo_dir,
            video_dir,
        }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }
}

impl MediaLibrary for DirectoryMediaLibrary {
    fn import_photo(
        &self,
        data: &[u8],
        extension: &str,
        paired_movie: Option<&Path>,
    ) -> Result<PathBuf, PhotoError> {
        std::fs::create_dir_all(&self.photo_dir)?;
        let path = unique_path(&self.photo_dir, "IMG", extension);
        std::fs::write(&path, data)?;
        info!(path = %path.display(), bytes = data.len(), "Photo saved");

        if let Some(movie) = paired_movie {
            let movie_dest = path.with_extension(files::LIVE_PHOTO_EXTENSION);
            move_file(movie, &movie_dest)?;
            debug!(path = %movie_dest.display(), "Paired movie saved");
        }
        Ok(path)
    }

    fn import_video(&self, source: &Path) -> Result<PathBuf, RecordingError> {
        std::fs::create_dir_all(&self.video_dir)?;
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        let path = unique_path(&self.video_dir, "VID", &extension);
        move_file(source, &path)?;
        info!(path = %path.display(), "Video saved");
        Ok(path)
    }
}

/// Timestamped `<prefix>_YYYYmmdd_HHMMSS[_n].<ext>` that does not exist yet
fn unique_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{}_{}", prefix, timestamp);
    let mut candidate = dir.join(format!("{}.{}", base, extension));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", base, n, extension));
        n += 1;
    }
    candidate
}

/// Rename, falling back to copy + delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    if let Err(e) = std::fs::remove_file(from) {
        warn!(path = %from.display(), error = %e, "Failed to remove source after copy");
    }
    Ok(())
}

/// Delete a temporary file, ignoring a missing one
pub fn remove_temp_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(files::APP_DIR)
}

pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(files::APP_DIR)
}
