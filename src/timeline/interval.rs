use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Inclusive span of frame indices during which slow playback applies.
///
/// Bounds are signed: padding around a motion event near the start of a
/// file produces a negative `start`, which is kept as-is and simply never
/// matches a real frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i64; 2]", into = "[i64; 2]")]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    /// "No activity ever found". Compares greater than every real frame index.
    pub const NEVER: Interval = Interval {
        start: i64::MAX,
        end: i64::MAX,
    };

    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(ConfigError::MalformedInterval {
                video: String::new(),
                details: format!("start {} is after end {}", start, end),
            }
            .into());
        }
        Ok(Self { start, end })
    }

    pub fn is_never(&self) -> bool {
        *self == Self::NEVER
    }

    pub fn contains(&self, index: u64) -> bool {
        let index = index as i64;
        self.start <= index && index <= self.end
    }
}

impl TryFrom<[i64; 2]> for Interval {
    type Error = String;

    fn try_from([start, end]: [i64; 2]) -> std::result::Result<Self, Self::Error> {
        if start > end {
            return Err(format!("interval [{}, {}] has start after end", start, end));
        }
        Ok(Self { start, end })
    }
}

impl From<Interval> for [i64; 2] {
    fn from(interval: Interval) -> Self {
        [interval.start, interval.end]
    }
}

/// Turn sorted motion timestamps into padded, merged active intervals.
///
/// The first timestamp is the synthetic "processing started" marker and does
/// not produce an interval. With fewer than two timestamps the result is
/// `[Interval::NEVER]`.
pub fn merge_intervals(
    timestamps: &[u64],
    fps: f64,
    before_seconds: f64,
    after_seconds: f64,
) -> Vec<Interval> {
    if timestamps.len() < 2 {
        return vec![Interval::NEVER];
    }

    let before = before_seconds * fps;
    let after = after_seconds * fps;

    let padded = timestamps[1..]
        .iter()
        .map(|&timestamp| {
            let timestamp = timestamp as f64;
            Interval {
                start: (timestamp - before).trunc() as i64,
                end: (timestamp + after).trunc() as i64,
            }
        })
        .collect();

    coalesce(padded)
}

/// Sort by start and fold overlapping or touching intervals together
pub fn coalesce(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(running) if interval.start <= running.end => {
                running.end = running.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Check that `intervals` is a final set: non-empty, well-formed, sorted
/// and pairwise disjoint.
pub fn validate_intervals(video: &str, intervals: &[Interval]) -> Result<()> {
    let malformed = |details: String| ConfigError::MalformedInterval {
        video: video.to_string(),
        details,
    };

    if intervals.is_empty() {
        return Err(malformed("interval set is empty".to_string()).into());
    }

    for interval in intervals {
        if interval.start > interval.end {
            return Err(malformed(format!("[{}, {}] has start after end", interval.start, interval.end)).into());
        }
    }

    for pair in intervals.windows(2) {
        if pair[0].end >= pair[1].start {
            return Err(malformed(format!(
                "[{}, {}] overlaps [{}, {}]",
                pair[0].start, pair[0].end, pair[1].start, pair[1].end
            ))
            .into());
        }
    }

    Ok(())
}
