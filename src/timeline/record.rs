use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::timeline::interval::{merge_intervals, Interval};

/// Motion scan result for one video.
///
/// `timestamps` and `fps` come from the extractor; `merged_intervals` is
/// filled in later by [`TimestampRecord::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampRecord {
    /// Sorted frame indices with motion, always starting with the synthetic 0
    pub timestamps: Vec<u64>,

    /// Source frame rate, rounded
    pub fps: u32,

    pub total_frames: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_intervals: Option<Vec<Interval>>,
}

impl TimestampRecord {
    /// Record from detected motion indices; the start marker is added here
    pub fn new(mut detections: Vec<u64>, fps: u32, total_frames: u64) -> Self {
        detections.push(0);
        detections.sort_unstable();
        Self {
            timestamps: detections,
            fps,
            total_frames,
            merged_intervals: None,
        }
    }

    /// Record for a video that skipped detection: full speed throughout
    pub fn inactive(fps: u32, total_frames: u64) -> Self {
        Self::new(Vec::new(), fps, total_frames)
    }

    /// Number of real motion detections, excluding the start marker
    pub fn detections(&self) -> usize {
        self.timestamps.len().saturating_sub(1)
    }

    /// Compute and store the active intervals
    pub fn merge(&mut self, before_seconds: f64, after_seconds: f64) -> &[Interval] {
        let merged = merge_intervals(&self.timestamps, self.fps as f64, before_seconds, after_seconds);
        self.merged_intervals.insert(merged)
    }

    pub fn intervals(&self) -> Option<&[Interval]> {
        self.merged_intervals.as_deref()
    }
}

/// Timestamp records keyed by video path, in path order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampStore {
    records: BTreeMap<String, TimestampRecord>,
}

impl TimestampStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, video: &str) -> Option<&TimestampRecord> {
        self.records.get(video)
    }

    pub fn contains(&self, video: &str) -> bool {
        self.records.contains_key(video)
    }

    pub fn insert(&mut self, video: String, record: TimestampRecord) -> Option<TimestampRecord> {
        self.records.insert(video, record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TimestampRecord)> {
        self.records.iter()
    }

    /// Recompute the intervals of every record with the given padding.
    /// Returns how many records ended up with different intervals.
    pub fn merge_all(&mut self, before_seconds: f64, after_seconds: f64) -> usize {
        let mut changed = 0;
        for record in self.records.values_mut() {
            let previous = record.merged_intervals.take();
            if previous.as_deref() != Some(record.merge(before_seconds, after_seconds)) {
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_adds_start_marker_and_sorts() {
        let record = TimestampRecord::new(vec![500, 100, 105], 50, 1000);
        assert_eq!(record.timestamps, vec![0, 100, 105, 500]);
        assert_eq!(record.detections(), 3);
        assert!(record.intervals().is_none());
    }

    #[test]
    fn test_detection_at_frame_zero_is_kept() {
        let record = TimestampRecord::new(vec![0, 40], 25, 100);
        assert_eq!(record.timestamps, vec![0, 0, 40]);
    }

    #[test]
    fn test_merge_stores_intervals() {
        let mut record = TimestampRecord::new(vec![100, 105, 500], 50, 1000);
        let merged = record.merge(1.0, 1.0).to_vec();
        assert_eq!(merged, vec![Interval { start: 50, end: 155 }, Interval { start: 450, end: 550 }]);
        assert_eq!(record.intervals(), Some(merged.as_slice()));

        let mut inactive = TimestampRecord::inactive(25, 100);
        assert_eq!(inactive.merge(1.0, 1.0), &[Interval::NEVER]);
    }

    #[test]
    fn test_merge_all_follows_padding_changes() {
        let mut store = TimestampStore::new();
        store.insert("a.mp4".to_string(), TimestampRecord::new(vec![10], 25, 100));
        store.insert("b.mp4".to_string(), TimestampRecord::inactive(25, 100));

        assert_eq!(store.merge_all(1.0, 1.0), 2);
        assert_eq!(store.merge_all(1.0, 1.0), 0);

        // Only the record with motion depends on the padding
        assert_eq!(store.merge_all(2.0, 2.0), 1);
        assert_eq!(
            store.get("a.mp4").unwrap().intervals(),
            Some([Interval { start: -40, end: 60 }].as_slice())
        );
    }

    #[test]
    fn test_persisted_shape() {
        let mut store = TimestampStore::new();
        let mut record = TimestampRecord::new(vec![100], 50, 1000);
        record.merge(1.0, 1.0);
        store.insert("cam/a.mp4".to_string(), record);

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cam/a.mp4": {
                    "timestamps": [0, 100],
                    "fps": 50,
                    "total_frames": 1000,
                    "merged_intervals": [[50, 150]]
                }
            })
        );

        let reloaded: TimestampStore = serde_json::from_value(json).unwrap();
        assert_eq!(reloaded, store);
    }
}
