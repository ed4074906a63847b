//! JSON persistence of timestamp records between runs.
//!
//! The extractor flushes after every chunk of videos, so an interrupted run
//! keeps every finished scan and the next run only scans what is missing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CheckpointError, Result};
use crate::timeline::TimestampStore;

#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored records, or an empty store when the file does not exist yet
    pub fn load(&self) -> Result<TimestampStore> {
        if !self.path.exists() {
            debug!("No checkpoint at {:?}, starting fresh", self.path);
            return Ok(TimestampStore::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let store: TimestampStore = serde_json::from_str(&content).map_err(|e| CheckpointError::ParseFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!("Loaded {} timestamp records from {:?}", store.len(), self.path);
        Ok(store)
    }

    /// Write `store` to a sibling temporary file and move it into place
    pub fn save(&self, store: &TimestampStore) -> Result<()> {
        let failed = |reason: String| CheckpointError::WriteFailed {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(store).map_err(|e| failed(e.to_string()))?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        fs::write(&temp, content).map_err(|e| failed(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| failed(e.to_string()))?;

        debug!("Saved {} timestamp records to {:?}", store.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Interval, TimestampRecord};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let checkpoint = CheckpointFile::new(dir.path().join("timestamps.json"));
        assert!(checkpoint.load().unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_keeps_merged_intervals() {
        let dir = tempdir().unwrap();
        let checkpoint = CheckpointFile::new(dir.path().join("cache/timestamps.json"));

        let mut store = TimestampStore::new();
        let mut record = TimestampRecord::new(vec![100, 105, 500], 50, 90_000);
        record.merge(1.0, 1.0);
        store.insert("cam/01h/a.mp4".to_string(), record);
        store.insert("cam/23h/b.mp4".to_string(), TimestampRecord::inactive(25, 1000));

        checkpoint.save(&store).unwrap();
        let reloaded = checkpoint.load().unwrap();
        assert_eq!(reloaded, store);
        assert_eq!(
            reloaded.get("cam/01h/a.mp4").unwrap().intervals(),
            Some([Interval { start: 50, end: 155 }, Interval { start: 450, end: 550 }].as_slice())
        );
        assert!(reloaded.get("cam/23h/b.mp4").unwrap().intervals().is_none());
        assert!(!dir.path().join("cache/timestamps.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timestamps.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            CheckpointFile::new(&path).load(),
            Err(crate::error::LapseError::Checkpoint(CheckpointError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn test_sentinel_survives_roundtrip() {
        let dir = tempdir().unwrap();
        let checkpoint = CheckpointFile::new(dir.path().join("t.json"));

        let mut store = TimestampStore::new();
        let mut record = TimestampRecord::inactive(30, 10);
        record.merge(1.0, 1.0);
        store.insert("quiet.mp4".to_string(), record);

        checkpoint.save(&store).unwrap();
        assert_eq!(
            checkpoint.load().unwrap().get("quiet.mp4").unwrap().intervals(),
            Some([Interval::NEVER].as_slice())
        );
    }
}
