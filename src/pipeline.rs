//! Heading pipeline orchestrator
//!
//! [`Compass`] owns every piece of mutable pipeline state in one struct
//! behind a single mutex. Sensor samples and location updates may arrive on
//! different threads; each call locks once, runs its synchronous stages and
//! releases the lock before notifying the [`HeadingSink`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use nalgebra::Vector3;

use crate::accuracy::{AccuracyEstimator, HeadingHistory, QualityAssessor};
use crate::calibration::{CalibrationEngine, CalibrationProgress, CalibrationStatus};
use crate::compass::calculate_heading;
use crate::declination::{Declination, DeclinationTable, true_heading};
use crate::error::{CompassError, Result};
use crate::filter::{HeadingSmoother, VectorFilter};
use crate::math::normalize_degrees;
use crate::types::{CardinalDirection, CompassSettings, GeoCoordinate, HeadingResult, RawSample, SensorQuality};
use crate::validation::SampleValidator;

/// Quality hints below this downgrade the reported sensor quality
const DEGRADED_QUALITY_HINT: f32 = 0.5;

/// Consumer of pipeline output
///
/// Callbacks run on the thread that delivered the sample, after the
/// pipeline state has been unlocked.
pub trait HeadingSink: Send + Sync {
    /// A new heading is available
    fn on_heading_result(&self, result: &HeadingResult);

    /// Calibration progress changed
    fn on_calibration_progress(&self, _percent_complete: u8) {}
}

/// Sample counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Samples that produced a result
    pub accepted: u64,
    /// Samples dropped by validation
    pub rejected: u64,
    /// Samples dropped because a stage produced an unusable value
    pub failed: u64,
}

/// All mutable pipeline state
#[derive(Debug)]
struct PipelineState {
    calibration: CalibrationEngine,
    filter: VectorFilter,
    smoother: HeadingSmoother,
    history: HeadingHistory,
    quality: QualityAssessor,
    declination: Declination,
    location: Option<GeoCoordinate>,
    last_quality: SensorQuality,
    last_progress: Option<u8>,
    stats: PipelineStats,
}

impl PipelineState {
    fn new(settings: &CompassSettings) -> Self {
        Self {
            calibration: CalibrationEngine::new(settings.calibration),
            filter: VectorFilter::new(&settings.filter),
            smoother: HeadingSmoother::new(settings.smoothing),
            history: HeadingHistory::new(settings.accuracy.history_capacity),
            quality: QualityAssessor::new(settings.quality),
            declination: Declination::NONE,
            location: None,
            last_quality: SensorQuality::Unknown,
            last_progress: None,
            stats: PipelineStats::default(),
        }
    }
}

/// Work computed for one sample before any state is committed
struct StagedSample {
    filter: VectorFilter,
    smoother: HeadingSmoother,
    quality: QualityAssessor,
    quality_hint: f32,
    /// Unsmoothed heading before declination
    raw_magnetic_heading: f32,
    result: HeadingResult,
}

/// Outcome of one locked pipeline pass
struct Processed {
    result: Option<HeadingResult>,
    progress: Option<u8>,
}

/// Sensor-fusion compass
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::{Compass, GeoCoordinate, RawSample};
///
/// let compass = Compass::new();
/// compass.on_location_update(GeoCoordinate::new(51.51, -0.13));
///
/// let sample = RawSample::new(Vector3::new(20.0, 0.0, 10.0), Vector3::new(0.0, 0.0, 9.8), 0);
/// let result = compass.on_raw_sample(sample).unwrap();
/// assert!((result.true_heading - 1.0).abs() < 1e-3);
/// ```
pub struct Compass {
    settings: CompassSettings,
    validator: SampleValidator,
    accuracy: AccuracyEstimator,
    declination_table: DeclinationTable,
    state: Mutex<PipelineState>,
    sink: Option<Arc<dyn HeadingSink>>,
}

impl Compass {
    /// Create a compass with default settings
    pub fn new() -> Self {
        Self::build(CompassSettings::default())
    }

    /// Create a compass with validated settings
    pub fn with_settings(settings: CompassSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(settings))
    }

    fn build(settings: CompassSettings) -> Self {
        Self {
            settings,
            validator: SampleValidator::new(settings.validation),
            accuracy: AccuracyEstimator::new(settings.accuracy),
            declination_table: DeclinationTable::default(),
            state: Mutex::new(PipelineState::new(&settings)),
            sink: None,
        }
    }

    /// Replace the declination table
    pub fn with_declination_table(mut self, table: DeclinationTable) -> Self {
        self.declination_table = table;
        self
    }

    /// Attach the consumer notified of results and calibration progress
    pub fn with_sink(mut self, sink: Arc<dyn HeadingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn settings(&self) -> &CompassSettings {
        &self.settings
    }

    /// Feed one raw sample through the pipeline
    ///
    /// Returns `None` when the sample was dropped. Dropped samples leave the
    /// pipeline state untouched apart from the statistics counters. Every
    /// stage is total over finite input, so a sample that passes validation
    /// can only fail as [`CompassError::NonFiniteHeading`] and never panics.
    pub fn on_raw_sample(&self, sample: RawSample) -> Option<HeadingResult> {
        let processed = {
            let mut state = self.lock();
            self.process_locked(&mut state, &sample)
        };

        if let Some(sink) = &self.sink {
            if let Some(percent) = processed.progress {
                sink.on_calibration_progress(percent);
            }
            if let Some(result) = &processed.result {
                sink.on_heading_result(result);
            }
        }

        processed.result
    }

    /// Update the location used for declination
    ///
    /// Invalid coordinates are ignored and the previous declination stays in
    /// effect.
    pub fn on_location_update(&self, coordinate: GeoCoordinate) {
        let coordinate = match coordinate.validated() {
            Ok(coordinate) => coordinate,
            Err(error) => {
                warn!("ignoring location update: {error}");
                return;
            }
        };

        let declination = self.declination_table.declination_for(&coordinate);
        let mut state = self.lock();
        if state.declination.source != declination.source {
            debug!("declination source now {:?}", declination.source);
        }
        state.declination = declination;
        state.location = Some(coordinate);
    }

    /// Begin a calibration cycle; a no-op while one is collecting
    pub fn start_calibration(&self) -> bool {
        let started = self.lock().calibration.start();
        if started {
            if let Some(sink) = &self.sink {
                sink.on_calibration_progress(0);
            }
        }
        started
    }

    /// Abort the running calibration cycle
    pub fn cancel_calibration(&self) {
        let mut state = self.lock();
        state.calibration.cancel();
        state.last_progress = None;
    }

    /// Whether a calibration has completed this session
    pub fn is_calibrated(&self) -> bool {
        self.lock().calibration.is_calibrated()
    }

    /// True until the first calibration while no cycle is running
    pub fn needs_calibration(&self) -> bool {
        self.lock().calibration.needs_calibration()
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.lock().calibration.status()
    }

    pub fn calibration_progress(&self) -> CalibrationProgress {
        self.lock().calibration.progress()
    }

    /// Hard-iron correction currently applied to magnetometer readings
    pub fn calibration_offset(&self) -> Vector3<f32> {
        self.lock().calibration.offset()
    }

    /// Sensor quality of the most recent accepted sample
    pub fn current_quality(&self) -> SensorQuality {
        self.lock().last_quality
    }

    /// Declination applied to new results
    pub fn current_declination(&self) -> Declination {
        self.lock().declination
    }

    /// Last valid location received
    pub fn current_location(&self) -> Option<GeoCoordinate> {
        self.lock().location
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock().stats
    }

    /// Clear filter, smoothing and history state
    ///
    /// Calibration and declination are kept.
    pub fn reset_filters(&self) {
        let mut state = self.lock();
        state.filter.reset();
        state.smoother.reset();
        state.history.clear();
        state.quality.reset();
        state.last_quality = SensorQuality::Unknown;
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        // Every mutation is committed in one step, so a poisoned guard still
        // holds consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_locked(&self, state: &mut PipelineState, sample: &RawSample) -> Processed {
        let staged = self
            .validator
            .validate(sample)
            .into_result()
            .map_err(CompassError::from)
            .and_then(|quality_hint| self.stage(state, sample, quality_hint));

        let staged = match staged {
            Ok(staged) => staged,
            Err(CompassError::Rejected(reason)) => {
                debug!("dropping sample at {} ms: {reason}", sample.timestamp_ms);
                state.stats.rejected += 1;
                return Processed {
                    result: None,
                    progress: None,
                };
            }
            Err(error) => {
                warn!("dropping sample at {} ms: {error}", sample.timestamp_ms);
                state.stats.failed += 1;
                return Processed {
                    result: None,
                    progress: None,
                };
            }
        };

        let previous_offset = state.calibration.offset();
        let progress = state
            .calibration
            .add_sample(sample)
            .map(|progress| progress.percent)
            .filter(|&percent| state.last_progress != Some(percent));
        if progress.is_some() {
            state.last_progress = progress;
        }

        state.filter = staged.filter;
        state.smoother = staged.smoother;
        state.quality = staged.quality;
        state.history.push(staged.raw_magnetic_heading, sample.timestamp_ms);

        // A new offset applies from the next sample; filter and smoother state
        // built from the old one must not leak into it
        let offset_delta = state.calibration.offset() - previous_offset;
        if offset_delta != Vector3::zeros() {
            debug!("rebasing filters on new calibration offset");
            state.filter.shift(offset_delta);
            state.smoother.reset();
        }

        let mut result = staged.result;
        result.accuracy_score = (self.accuracy.score(&state.history) * staged.quality_hint).clamp(0.0, 1.0);
        result.is_calibrated = state.calibration.is_calibrated();
        state.last_quality = result.sensor_quality;
        state.stats.accepted += 1;

        trace!(
            "heading {:.1}° true, {:.1}° magnetic, accuracy {:.2}",
            result.true_heading, result.magnetic_heading, result.accuracy_score
        );

        Processed {
            result: Some(result),
            progress,
        }
    }

    /// Run the numeric stages on copies of the filter state
    fn stage(&self, state: &PipelineState, sample: &RawSample, quality_hint: f32) -> Result<StagedSample> {
        let mut filter = state.filter;
        let mut smoother = state.smoother;
        let mut quality = state.quality;

        let corrected = state.calibration.correct(sample.magnetometer);
        let filtered = filter.update(corrected);

        let estimate = calculate_heading(sample.accelerometer, filtered);
        let declination = state.declination.value;
        let raw_true_heading = true_heading(estimate.degrees, declination);
        let smoothed_true = smoother.update(raw_true_heading, sample.timestamp_ms);
        let magnetic_heading = normalize_degrees(smoothed_true - declination);

        if ![estimate.degrees, smoothed_true, magnetic_heading].iter().all(|v| v.is_finite()) {
            return Err(CompassError::NonFiniteHeading);
        }

        let mut sensor_quality = quality.assess(sample);
        if quality_hint < DEGRADED_QUALITY_HINT {
            sensor_quality = sensor_quality.downgraded();
        }

        Ok(StagedSample {
            filter,
            smoother,
            quality,
            quality_hint,
            raw_magnetic_heading: estimate.degrees,
            result: HeadingResult {
                magnetic_heading,
                true_heading: smoothed_true,
                declination_applied: declination,
                accuracy_score: 0.0,
                sensor_quality,
                is_calibrated: false,
                cardinal: CardinalDirection::from_heading(smoothed_true),
                field_strength: corrected.norm(),
                method: estimate.method,
                timestamp_ms: sample.timestamp_ms,
            },
        })
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::new()
    }
}
