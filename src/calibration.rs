//! Hard-iron magnetometer calibration
//!
//! The engine collects samples opportunistically while the pipeline runs.
//! Once enough samples have been gathered and every axis is steady, the
//! per-axis bias is estimated with the midpoint of the observed range and
//! swapped in as a whole.

use std::collections::VecDeque;

use log::{debug, info};
use nalgebra::Vector3;

use crate::types::{CalibrationSettings, RawSample};

/// Calibration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStatus {
    /// No cycle running
    #[default]
    Idle,
    /// Buffering samples until the completion criteria are met
    Collecting,
    /// Offset estimated and in use
    Complete,
}

/// Snapshot reported after each sample fed to a running cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProgress {
    pub status: CalibrationStatus,
    /// Samples currently buffered
    pub samples: usize,
    /// Completion percentage, 100 only once the offset is in use
    pub percent: u8,
}

/// Removes the hard-iron bias from a magnetometer reading
///
/// `offset` is the correction vector, i.e. the negated bias.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::calibration::apply_hard_iron;
///
/// let raw = Vector3::new(100.0, 200.0, 300.0);
/// let offset = Vector3::new(-10.0, -20.0, -30.0);
/// assert_eq!(apply_hard_iron(raw, offset), Vector3::new(90.0, 180.0, 270.0));
/// ```
pub fn apply_hard_iron(uncalibrated: Vector3<f32>, offset: Vector3<f32>) -> Vector3<f32> {
    uncalibrated + offset
}

/// Session-scoped hard-iron calibration state machine
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    settings: CalibrationSettings,
    status: CalibrationStatus,
    buffer: VecDeque<RawSample>,
    /// Correction added to raw readings (negated bias)
    offset: Vector3<f32>,
    variance: Vector3<f32>,
    /// Set by the first completion and never cleared for the session
    calibrated: bool,
}

impl CalibrationEngine {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            status: CalibrationStatus::Idle,
            buffer: VecDeque::with_capacity(settings.buffer_capacity),
            offset: Vector3::zeros(),
            variance: Vector3::zeros(),
            calibrated: false,
        }
    }

    /// Begin a calibration cycle
    ///
    /// Returns `false` without touching the buffer when a cycle is already
    /// collecting. A completed calibration keeps its offset in use until
    /// the new cycle completes.
    pub fn start(&mut self) -> bool {
        if self.status == CalibrationStatus::Collecting {
            debug!("calibration already collecting, start ignored");
            return false;
        }

        self.buffer.clear();
        self.variance = Vector3::zeros();
        self.status = CalibrationStatus::Collecting;
        info!("calibration started");
        true
    }

    /// Abort a running cycle, discarding its buffer
    ///
    /// Any offset from an earlier completion stays in effect.
    pub fn cancel(&mut self) {
        if self.status != CalibrationStatus::Collecting {
            return;
        }

        self.buffer.clear();
        self.variance = Vector3::zeros();
        self.status = CalibrationStatus::Idle;
        info!("calibration cancelled");
    }

    /// Feed a validated sample to a running cycle
    ///
    /// Returns `None` when no cycle is collecting.
    pub fn add_sample(&mut self, sample: &RawSample) -> Option<CalibrationProgress> {
        if self.status != CalibrationStatus::Collecting {
            return None;
        }

        if self.buffer.len() == self.settings.buffer_capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(*sample);

        let statistics = AxisStatistics::from_samples(&self.buffer);
        self.variance = statistics.variance;

        let threshold = self.settings.std_dev_threshold;
        let steady = statistics.variance.iter().all(|variance| variance.sqrt() < threshold);
        if self.buffer.len() >= self.settings.min_samples && steady {
            self.complete(statistics.midpoint());
        }

        Some(self.progress())
    }

    fn complete(&mut self, bias: Vector3<f32>) {
        self.offset = -bias;
        self.calibrated = true;
        self.status = CalibrationStatus::Complete;
        self.buffer.clear();
        info!(
            "calibration complete, hard-iron bias ({:.2}, {:.2}, {:.2}) µT",
            bias.x, bias.y, bias.z
        );
    }

    /// Current lifecycle state
    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    /// Progress of the running cycle
    pub fn progress(&self) -> CalibrationProgress {
        let percent = match self.status {
            CalibrationStatus::Idle => 0,
            CalibrationStatus::Complete => 100,
            CalibrationStatus::Collecting => {
                let ratio = self.buffer.len() * 100 / self.settings.min_samples.max(1);
                // 100 is reserved for a completed cycle
                ratio.min(99) as u8
            }
        };

        CalibrationProgress {
            status: self.status,
            samples: self.buffer.len(),
            percent,
        }
    }

    /// Percentage shown by calibration UI
    pub fn progress_percent(&self) -> u8 {
        self.progress().percent
    }

    /// Whether a calibration has completed this session
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// True until the first completion, while no cycle is running
    pub fn needs_calibration(&self) -> bool {
        !self.calibrated && self.status == CalibrationStatus::Idle
    }

    /// Correction vector added to raw readings
    pub fn offset(&self) -> Vector3<f32> {
        self.offset
    }

    /// Estimated hard-iron bias
    pub fn bias(&self) -> Vector3<f32> {
        -self.offset
    }

    /// Per-axis variance over the current buffer
    pub fn variance(&self) -> Vector3<f32> {
        self.variance
    }

    /// Remove the estimated bias from a magnetometer reading
    pub fn correct(&self, magnetometer: Vector3<f32>) -> Vector3<f32> {
        apply_hard_iron(magnetometer, self.offset)
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(CalibrationSettings::default())
    }
}

struct AxisStatistics {
    min: Vector3<f32>,
    max: Vector3<f32>,
    variance: Vector3<f32>,
}

impl AxisStatistics {
    fn from_samples(samples: &VecDeque<RawSample>) -> Self {
        let count = samples.len().max(1) as f32;
        let mut min = Vector3::repeat(f32::INFINITY);
        let mut max = Vector3::repeat(f32::NEG_INFINITY);
        let mut sum = Vector3::zeros();

        for sample in samples {
            let m = sample.magnetometer;
            min = min.inf(&m);
            max = max.sup(&m);
            sum += m;
        }

        let mean = sum / count;
        let variance = samples
            .iter()
            .map(|sample| (sample.magnetometer - mean).map(|d| d * d))
            .fold(Vector3::zeros(), |acc, squared| acc + squared)
            / count;

        Self { min, max, variance }
    }

    fn midpoint(&self) -> Vector3<f32> {
        (self.max + self.min) * 0.5
    }
}
