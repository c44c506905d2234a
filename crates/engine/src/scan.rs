//! Scanner module for discovering video files under a root directory.
//!
//! Walks the whole tree below the root, keeps files whose extension is in the
//! configured set and leaves out the `output_wm` subtree so earlier outputs are
//! never picked up as inputs.

use crate::config::normalize_extension;
use crate::naming::output_root;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Video file extensions recognized when no list is configured (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "flv", "webm"];

/// Error type for scan operations. All variants abort the run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root directory does not exist
    #[error("Root directory {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// Root path exists but is not a directory
    #[error("Root path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Root directory could not be read
    #[error("Failed to read root directory {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Recursive video file scanner.
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Lowercase extensions without the leading dot
    extensions: Vec<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(VIDEO_EXTENSIONS)
    }
}

impl Scanner {
    /// Create a scanner for the given extensions (leading dots and case are ignored).
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Checks if a file has one of the recognized extensions (case-insensitive).
    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.extensions.iter().any(|known| *known == ext_lower)
            })
            .unwrap_or(false)
    }

    /// Scans `root` for video files.
    ///
    /// This function:
    /// - Fails with [`ScanError`] if `root` is missing or not a directory
    /// - Recursively walks every subdirectory
    /// - Skips the `<root>/output_wm` subtree
    /// - Filters files by extension (case-insensitive)
    /// - Returns paths sorted lexicographically, so an unchanged tree always
    ///   enumerates in the same order
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let excluded = output_root(root);
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.file_type().is_dir() && entry.path() == excluded));

        let mut candidates = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(ScanError::Walk {
                        path: root.to_path_buf(),
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if !self.is_video_file(entry.path()) {
                continue;
            }

            candidates.push(entry.into_path());
        }

        candidates.sort();
        tracing::debug!(
            "Scanned {}: {} candidate video file(s)",
            root.display(),
            candidates.len()
        );
        Ok(candidates)
    }
}

/// Scans `root` with the default extension set.
pub fn scan_videos(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    Scanner::default().scan(root)
}
