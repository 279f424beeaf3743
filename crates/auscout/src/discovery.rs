//! Audio file enumeration under a batch root.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot read batch root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Batch root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Case-insensitive extension match against `extensions` (given without dots).
pub fn has_audio_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Recursively list files under `root` whose extension is in `extensions`.
///
/// Order is the order the filesystem yields entries. Unreadable entries below
/// the root are logged and skipped; an unreadable root is an error.
pub fn discover_audio_files(
    root: &Path,
    extensions: &[String],
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let meta = std::fs::metadata(root).map_err(|source| DiscoveryError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && has_audio_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    debug!("Found {} audio files under {}", files.len(), root.display());
    Ok(files)
}
