//! Maps merged intervals and two speed factors onto the exact list of
//! frames to re-encode.
//!
//! One counter runs across every video of a batch, so the selection cadence
//! stays in phase across file boundaries. [`FrameSelector::select_batch`]
//! threads it through the videos in order; [`FrameSelector::select_batch_parallel`]
//! derives each video's starting value from the frame counts instead.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::timeline::interval::validate_intervals;
use crate::timeline::record::TimestampRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedMode {
    /// Inside an active interval
    Slow,
    /// Outside every active interval
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedFrame {
    pub mode: SpeedMode,
    pub index: u64,
}

/// Frames picked from one video, strictly increasing by index
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSelection {
    pub video: String,
    pub frames: Vec<SelectedFrame>,
}

impl FrameSelection {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn count(&self, mode: SpeedMode) -> usize {
        self.frames.iter().filter(|f| f.mode == mode).count()
    }
}

/// Selections for a whole batch, in processing order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSelection {
    pub videos: Vec<FrameSelection>,
    /// Counter value after the last video
    pub counter: GlobalFrameCounter,
    pub settings: AccelerationSettings,
}

impl BatchSelection {
    pub fn total_selected(&self) -> usize {
        self.videos.iter().map(FrameSelection::len).sum()
    }
}

/// Monotonic frame counter shared by all videos of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalFrameCounter(u64);

impl GlobalFrameCounter {
    pub fn new(start: u64) -> Self {
        Self(start)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    fn increment(&mut self) {
        self.0 += 1;
    }
}

/// Keep one frame out of every `n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence(u64);

impl Cadence {
    /// `round(factor * fps / output_fps)`; zero is a configuration error
    pub fn new(factor: f64, fps: f64, output_fps: f64) -> Result<Self> {
        let modulus = (factor * fps / output_fps).round();
        if !modulus.is_finite() || modulus < 1.0 {
            return Err(ConfigError::ZeroCadence { factor, fps, output_fps }.into());
        }
        Ok(Self(modulus as u64))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn admits(&self, counter: GlobalFrameCounter) -> bool {
        counter.value() % self.0 == 0
    }
}

/// Output frame rate and the speed-up applied inside and outside active intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSettings {
    pub output_fps: f64,
    pub slow_factor: f64,
    pub fast_factor: f64,
}

impl AccelerationSettings {
    pub fn factor(&self, mode: SpeedMode) -> f64 {
        match mode {
            SpeedMode::Slow => self.slow_factor,
            SpeedMode::Fast => self.fast_factor,
        }
    }

    /// Both cadences for a source recorded at `fps`
    pub fn cadences(&self, fps: f64) -> Result<(Cadence, Cadence)> {
        Ok((
            Cadence::new(self.slow_factor, fps, self.output_fps)?,
            Cadence::new(self.fast_factor, fps, self.output_fps)?,
        ))
    }
}

pub struct FrameSelector {
    settings: AccelerationSettings,
}

impl FrameSelector {
    pub fn new(settings: AccelerationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AccelerationSettings {
        &self.settings
    }

    /// Select frames from one video, advancing `counter` by `total_frames`
    pub fn select(
        &self,
        video: &str,
        record: &TimestampRecord,
        counter: &mut GlobalFrameCounter,
    ) -> Result<FrameSelection> {
        let intervals = record.intervals().ok_or_else(|| ConfigError::MalformedInterval {
            video: video.to_string(),
            details: "intervals have not been merged".to_string(),
        })?;
        validate_intervals(video, intervals)?;

        let (slow, fast) = self.settings.cadences(record.fps as f64)?;

        let mut frames = Vec::new();
        let mut cursor = 0;

        for index in 0..record.total_frames {
            let position = index as i64;
            while cursor < intervals.len() && position > intervals[cursor].end {
                cursor += 1;
            }

            let active = intervals.get(cursor).is_some_and(|interval| interval.start <= position);
            let (mode, cadence) = if active {
                (SpeedMode::Slow, slow)
            } else {
                (SpeedMode::Fast, fast)
            };

            if cadence.admits(*counter) {
                frames.push(SelectedFrame { mode, index });
            }
            counter.increment();
        }

        debug!(
            "{}: selected {} of {} frames (cadence slow {} / fast {})",
            video,
            frames.len(),
            record.total_frames,
            slow.get(),
            fast.get()
        );

        Ok(FrameSelection {
            video: video.to_string(),
            frames,
        })
    }

    /// Select frames from every video in order, threading one counter through
    pub fn select_batch(
        &self,
        records: &[(&str, &TimestampRecord)],
        start: GlobalFrameCounter,
    ) -> Result<BatchSelection> {
        if records.is_empty() {
            return Err(ConfigError::EmptyVideoSet.into());
        }

        let mut counter = start;
        let videos = records
            .iter()
            .map(|(video, record)| self.select(video, record, &mut counter))
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchSelection {
            videos,
            counter,
            settings: self.settings,
        })
    }

    /// Same result as [`Self::select_batch`], computed per video on the rayon pool
    pub fn select_batch_parallel(
        &self,
        records: &[(&str, &TimestampRecord)],
        start: GlobalFrameCounter,
    ) -> Result<BatchSelection> {
        if records.is_empty() {
            return Err(ConfigError::EmptyVideoSet.into());
        }

        let offsets: Vec<u64> = records
            .iter()
            .scan(start.value(), |offset, (_, record)| {
                let current = *offset;
                *offset += record.total_frames;
                Some(current)
            })
            .collect();

        let videos = records
            .par_iter()
            .zip(offsets.par_iter())
            .map(|((video, record), &offset)| {
                let mut counter = GlobalFrameCounter::new(offset);
                self.select(video, record, &mut counter)
            })
            .collect::<Result<Vec<_>>>()?;

        let total: u64 = records.iter().map(|(_, record)| record.total_frames).sum();
        Ok(BatchSelection {
            videos,
            counter: GlobalFrameCounter::new(start.value() + total),
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::interval::Interval;

    fn settings(slow: f64, fast: f64) -> AccelerationSettings {
        AccelerationSettings {
            output_fps: 25.0,
            slow_factor: slow,
            fast_factor: fast,
        }
    }

    fn record(detections: Vec<u64>, total_frames: u64) -> TimestampRecord {
        let mut record = TimestampRecord::new(detections, 25, total_frames);
        record.merge(1.0, 1.0);
        record
    }

    #[test]
    fn test_cadence_rounds() {
        assert_eq!(Cadence::new(140.0, 25.0, 50.0).unwrap().get(), 70);
        assert_eq!(Cadence::new(3.0, 25.0, 50.0).unwrap().get(), 2);
        assert_eq!(Cadence::new(1.0, 30.0, 20.0).unwrap().get(), 2);
    }

    #[test]
    fn test_zero_cadence_fails_fast() {
        let result = Cadence::new(0.4, 25.0, 25.0);
        assert!(matches!(
            result,
            Err(crate::error::LapseError::Config(ConfigError::ZeroCadence { .. }))
        ));

        let selector = FrameSelector::new(settings(0.2, 10.0));
        let mut counter = GlobalFrameCounter::default();
        assert!(selector.select("a", &record(vec![50], 100), &mut counter).is_err());
    }

    #[test]
    fn test_inactive_video_is_all_fast() {
        let selector = FrameSelector::new(settings(2.0, 10.0));
        let mut counter = GlobalFrameCounter::default();
        let selection = selector.select("quiet", &record(vec![], 1000), &mut counter).unwrap();

        assert_eq!(selection.len(), 100);
        assert_eq!(selection.count(SpeedMode::Slow), 0);
        assert_eq!(counter.value(), 1000);
    }

    #[test]
    fn test_slow_inside_intervals() {
        // Motion at 100 -> active [75, 125]
        let selector = FrameSelector::new(settings(1.0, 50.0));
        let mut counter = GlobalFrameCounter::default();
        let selection = selector.select("cam", &record(vec![100], 300), &mut counter).unwrap();

        let slow: Vec<u64> = selection.frames.iter()
            .filter(|f| f.mode == SpeedMode::Slow)
            .map(|f| f.index)
            .collect();
        assert_eq!(slow, (75..=125).collect::<Vec<_>>());

        let fast: Vec<u64> = selection.frames.iter()
            .filter(|f| f.mode == SpeedMode::Fast)
            .map(|f| f.index)
            .collect();
        assert_eq!(fast, vec![0, 50, 150, 200, 250]);
    }

    #[test]
    fn test_cursor_skips_several_short_intervals() {
        let selector = FrameSelector::new(settings(1.0, 1000.0));
        let mut rec = TimestampRecord::new(vec![10, 20, 30], 25, 40);
        rec.merged_intervals = Some(vec![
            Interval { start: 2, end: 2 },
            Interval { start: 4, end: 4 },
            Interval { start: 6, end: 6 },
        ]);

        let mut counter = GlobalFrameCounter::new(1);
        let selection = selector.select("cam", &rec, &mut counter).unwrap();
        let slow: Vec<u64> = selection.frames.iter()
            .filter(|f| f.mode == SpeedMode::Slow)
            .map(|f| f.index)
            .collect();
        assert_eq!(slow, vec![2, 4, 6]);
    }

    #[test]
    fn test_fast_spacing_matches_cadence() {
        let selector = FrameSelector::new(settings(2.0, 7.0));
        let mut counter = GlobalFrameCounter::new(3);
        let rec = record(vec![400, 900], 2000);
        let selection = selector.select("cam", &rec, &mut counter).unwrap();
        let intervals = rec.intervals().unwrap();

        for pair in selection.frames.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let same_gap = !intervals.iter().any(|i| (a.index as i64) < i.start && i.start <= b.index as i64)
                && !intervals.iter().any(|i| (a.index as i64) <= i.end && i.end < b.index as i64);
            if a.mode == SpeedMode::Fast && b.mode == SpeedMode::Fast && same_gap {
                assert_eq!(b.index - a.index, 7);
            }
        }
    }

    #[test]
    fn test_zero_frames() {
        let selector = FrameSelector::new(settings(2.0, 10.0));
        let mut counter = GlobalFrameCounter::new(42);
        let selection = selector.select("empty", &record(vec![], 0), &mut counter).unwrap();
        assert!(selection.is_empty());
        assert_eq!(counter.value(), 42);
    }

    #[test]
    fn test_unmerged_record_is_rejected() {
        let selector = FrameSelector::new(settings(2.0, 10.0));
        let mut counter = GlobalFrameCounter::default();
        let raw = TimestampRecord::new(vec![5], 25, 10);
        assert!(matches!(
            selector.select("raw", &raw, &mut counter),
            Err(crate::error::LapseError::Config(ConfigError::MalformedInterval { .. }))
        ));
    }

    #[test]
    fn test_batch_counter_and_phase() {
        let selector = FrameSelector::new(settings(2.0, 10.0));
        let a = record(vec![], 13);
        let b = record(vec![], 20);
        let c = record(vec![30], 77);
        let batch = selector
            .select_batch(&[("a", &a), ("b", &b), ("c", &c)], GlobalFrameCounter::default())
            .unwrap();

        assert_eq!(batch.counter.value(), 13 + 20 + 77);
        // a keeps counters 0 and 10; b starts at counter 13, so its first pick is index 7
        assert_eq!(batch.videos[0].frames.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 10]);
        assert_eq!(batch.videos[1].frames[0].index, 7);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let selector = FrameSelector::new(settings(3.0, 11.0));
        let records: Vec<(String, TimestampRecord)> = (0..8)
            .map(|i| (format!("v{}", i), record(vec![i * 37 + 5, i * 91 + 300], 500 + i * 13)))
            .collect();
        let refs: Vec<(&str, &TimestampRecord)> = records.iter().map(|(k, r)| (k.as_str(), r)).collect();

        let sequential = selector.select_batch(&refs, GlobalFrameCounter::new(5)).unwrap();
        let parallel = selector.select_batch_parallel(&refs, GlobalFrameCounter::new(5)).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_empty_batch_is_config_error() {
        let selector = FrameSelector::new(settings(2.0, 10.0));
        assert!(matches!(
            selector.select_batch(&[], GlobalFrameCounter::default()),
            Err(crate::error::LapseError::Config(ConfigError::EmptyVideoSet))
        ));
        assert!(selector.select_batch_parallel(&[], GlobalFrameCounter::default()).is_err());
    }
}
