use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{ConfigError, Result};

/// All files under `root` with the given extension, sorted by path.
///
/// The extension match ignores case and a leading dot. Unreadable
/// directory entries are logged and skipped.
pub fn find_videos<P: AsRef<Path>>(root: P, extension: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(ConfigError::InvalidValue {
            key: "input".to_string(),
            value: format!("{} is not a directory", root.display()),
        }
        .into());
    }

    let extension = extension.trim_start_matches('.');
    let mut videos: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();

    videos.sort();
    info!("A total of {} video files found in {:?}", videos.len(), root);
    Ok(videos)
}
