//! Heading accuracy scoring and sensor quality classification

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::math::shortest_angular_delta;
use crate::types::{AccuracySettings, QualityThresholds, RawSample, SensorQuality};

/// One heading observation kept for variance scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingHistoryEntry {
    /// Heading in degrees, `[0, 360)`
    pub heading: f32,
    pub timestamp_ms: u64,
}

/// Bounded FIFO of recent headings
#[derive(Debug, Clone)]
pub struct HeadingHistory {
    entries: VecDeque<HeadingHistoryEntry>,
    capacity: usize,
}

impl HeadingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, heading: f32, timestamp_ms: u64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HeadingHistoryEntry { heading, timestamp_ms });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HeadingHistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Scores heading reliability from the spread of recent headings
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyEstimator {
    settings: AccuracySettings,
}

impl AccuracyEstimator {
    pub fn new(settings: AccuracySettings) -> Self {
        Self { settings }
    }

    /// Accuracy in `[0, 1]`; zero until the history holds enough entries
    ///
    /// The newest `window` headings are re-based on the first of them so the
    /// 0°/360° seam does not inflate the spread, then their standard
    /// deviation is mapped linearly onto `[0, 1]`.
    pub fn score(&self, history: &HeadingHistory) -> f32 {
        if history.len() < self.settings.min_history {
            return 0.0;
        }

        let std_dev = self.window_std_dev(history);
        (1.0 - std_dev / self.settings.zero_accuracy_std_dev).clamp(0.0, 1.0)
    }

    /// Standard deviation in degrees over the scoring window
    pub fn window_std_dev(&self, history: &HeadingHistory) -> f32 {
        let window = self.settings.window.min(history.len());
        if window == 0 {
            return 0.0;
        }

        let mut recent = history.iter().skip(history.len() - window);
        let Some(reference) = recent.next().map(|entry| entry.heading) else {
            return 0.0;
        };

        // Offsets from the reference, the reference itself contributing zero
        let offsets: Vec<f32> = core::iter::once(0.0)
            .chain(recent.map(|entry| shortest_angular_delta(reference, entry.heading)))
            .collect();

        let count = offsets.len() as f32;
        let mean = offsets.iter().sum::<f32>() / count;
        let variance = offsets.iter().map(|offset| (offset - mean).powi(2)).sum::<f32>() / count;
        variance.sqrt()
    }
}

/// Classifies sensor stability from sample-to-sample variation
#[derive(Debug, Clone, Copy)]
pub struct QualityAssessor {
    thresholds: QualityThresholds,
    previous: Option<(Vector3<f32>, Vector3<f32>)>,
}

impl QualityAssessor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self {
            thresholds,
            previous: None,
        }
    }

    /// Classify a sample against the one before it
    ///
    /// Returns `Unknown` for the first sample. The sample becomes the
    /// reference for the next call.
    pub fn assess(&mut self, sample: &RawSample) -> SensorQuality {
        let current = (sample.magnetometer, sample.accelerometer);
        let quality = match self.previous {
            Some(previous) => self.classify(previous, current),
            None => SensorQuality::Unknown,
        };
        self.previous = Some(current);
        quality
    }

    /// Classify a pair of consecutive (magnetometer, accelerometer) readings
    pub fn classify(
        &self,
        previous: (Vector3<f32>, Vector3<f32>),
        current: (Vector3<f32>, Vector3<f32>),
    ) -> SensorQuality {
        let magnetic = grade((current.0 - previous.0).norm(), &self.thresholds.magnetometer);
        let inertial = grade((current.1 - previous.1).norm(), &self.thresholds.accelerometer);
        magnetic.worst(inertial)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

fn grade(variation: f32, limits: &[f32; 3]) -> SensorQuality {
    let [excellent, good, fair] = *limits;
    if variation <= excellent {
        SensorQuality::Excellent
    } else if variation <= good {
        SensorQuality::Good
    } else if variation <= fair {
        SensorQuality::Fair
    } else {
        SensorQuality::Poor
    }
}
