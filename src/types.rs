//! Core types and settings for the compass pipeline

use core::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{CompassError, Result};
use crate::math::STANDARD_GRAVITY;

/// Physical sensor a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    /// Three-axis magnetometer (µT)
    Magnetometer,
    /// Three-axis accelerometer (m/s²)
    Accelerometer,
    /// Three-axis gyroscope (rad/s)
    Gyroscope,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
        };
        f.write_str(name)
    }
}

/// One synchronized reading from the motion sensors
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::RawSample;
///
/// let sample = RawSample::new(
///     Vector3::new(20.0, 0.0, 10.0), // µT
///     Vector3::new(0.0, 0.0, 9.8),   // m/s²
///     1_000,
/// );
/// assert!(sample.gyroscope.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Magnetometer reading in µT
    pub magnetometer: Vector3<f32>,
    /// Accelerometer reading in m/s²
    pub accelerometer: Vector3<f32>,
    /// Gyroscope reading in rad/s, when the device has one
    pub gyroscope: Option<Vector3<f32>>,
    /// Capture time on a monotonic clock, in milliseconds
    pub timestamp_ms: u64,
}

impl RawSample {
    /// Build a sample without gyroscope data
    pub fn new(magnetometer: Vector3<f32>, accelerometer: Vector3<f32>, timestamp_ms: u64) -> Self {
        Self {
            magnetometer,
            accelerometer,
            gyroscope: None,
            timestamp_ms,
        }
    }

    /// Attach a gyroscope reading
    pub fn with_gyroscope(mut self, gyroscope: Vector3<f32>) -> Self {
        self.gyroscope = Some(gyroscope);
        self
    }
}

/// Geographic position supplied by the location provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validated(self) -> Result<Self> {
        let in_range = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);

        if in_range {
            Ok(self)
        } else {
            Err(CompassError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// Coarse classification of instantaneous sensor stability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    /// No previous sample to compare against
    #[default]
    Unknown,
}

impl SensorQuality {
    /// One level worse; `Poor` and `Unknown` stay where they are
    pub fn downgraded(self) -> Self {
        match self {
            SensorQuality::Excellent => SensorQuality::Good,
            SensorQuality::Good => SensorQuality::Fair,
            SensorQuality::Fair | SensorQuality::Poor => SensorQuality::Poor,
            SensorQuality::Unknown => SensorQuality::Unknown,
        }
    }

    /// The worse of two known classifications
    pub fn worst(self, other: Self) -> Self {
        if self.rank() >= other.rank() { self } else { other }
    }

    fn rank(self) -> u8 {
        match self {
            SensorQuality::Excellent => 0,
            SensorQuality::Good => 1,
            SensorQuality::Fair => 2,
            SensorQuality::Poor => 3,
            SensorQuality::Unknown => 4,
        }
    }
}

/// Which heading formula produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingMethod {
    /// Magnetometer projected onto the plane orthogonal to gravity
    TiltCompensated,
    /// Plain `atan2` on the horizontal magnetometer axes
    Planar,
}

/// Sixteen-point compass rose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardinalDirection {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl CardinalDirection {
    const ROSE: [CardinalDirection; 16] = [
        CardinalDirection::N,
        CardinalDirection::NNE,
        CardinalDirection::NE,
        CardinalDirection::ENE,
        CardinalDirection::E,
        CardinalDirection::ESE,
        CardinalDirection::SE,
        CardinalDirection::SSE,
        CardinalDirection::S,
        CardinalDirection::SSW,
        CardinalDirection::SW,
        CardinalDirection::WSW,
        CardinalDirection::W,
        CardinalDirection::WNW,
        CardinalDirection::NW,
        CardinalDirection::NNW,
    ];

    /// Nearest compass point for a heading in degrees
    ///
    /// # Example
    /// ```
    /// use compass_fusion::CardinalDirection;
    ///
    /// assert_eq!(CardinalDirection::from_heading(359.0), CardinalDirection::N);
    /// assert_eq!(CardinalDirection::from_heading(91.0), CardinalDirection::E);
    /// ```
    pub fn from_heading(heading: f32) -> Self {
        let sector = (crate::math::normalize_degrees(heading) / 22.5).round() as usize % 16;
        Self::ROSE[sector]
    }
}

/// Heading produced for one accepted sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingResult {
    /// Smoothed heading relative to magnetic north, `[0, 360)`
    pub magnetic_heading: f32,
    /// Smoothed heading relative to true north, `[0, 360)`
    pub true_heading: f32,
    /// Declination added to obtain the true heading (degrees, east positive)
    pub declination_applied: f32,
    /// Confidence in `[0, 1]` from recent heading variance and field quality
    pub accuracy_score: f32,
    /// Stability class of the raw sensor readings
    pub sensor_quality: SensorQuality,
    /// Whether a hard-iron calibration has completed this session
    pub is_calibrated: bool,
    /// Compass point for the true heading
    pub cardinal: CardinalDirection,
    /// Magnitude of the bias-corrected magnetic field in µT
    pub field_strength: f32,
    /// Formula used for this heading
    pub method: HeadingMethod,
    /// Timestamp of the sample this result was derived from
    pub timestamp_ms: u64,
}

/// Sample validator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Magnetometer saturation bound per axis (µT)
    pub magnetometer_saturation: f32,
    /// Accelerometer saturation bound per axis (m/s²)
    pub accelerometer_saturation: f32,
    /// Gyroscope saturation bound per axis (rad/s)
    pub gyroscope_saturation: f32,
    /// Field magnitude below which the magnetometer is considered disconnected (µT)
    pub noise_floor: f32,
    /// Range of typical Earth field strengths (µT)
    pub typical_field: (f32, f32),
    /// Sub-range that earns full quality credit (µT)
    pub ideal_field: (f32, f32),
    /// Axis magnitude below which an axis looks dead (µT)
    pub dead_axis_threshold: f32,
    /// Fraction of the saturation bound treated as "near saturation"
    pub near_saturation_ratio: f32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            magnetometer_saturation: 200.0,
            accelerometer_saturation: 16.0 * STANDARD_GRAVITY,
            gyroscope_saturation: 35.0,
            noise_floor: 5.0,
            typical_field: (15.0, 80.0),
            ideal_field: (20.0, 60.0),
            dead_axis_threshold: 0.05,
            near_saturation_ratio: 0.9,
        }
    }
}

/// Hard-iron calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Ring buffer capacity in samples
    pub buffer_capacity: usize,
    /// Samples required before completion is considered
    pub min_samples: usize,
    /// Per-axis standard deviation that must not be exceeded (raw units)
    pub std_dev_threshold: f32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            min_samples: 50,
            std_dev_threshold: 0.1,
        }
    }
}

/// Noise filter applied to the bias-corrected magnetometer vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VectorFilterKind {
    /// Exponential low-pass filter
    #[default]
    LowPass,
    /// Independent scalar Kalman filter per axis
    Kalman,
}

/// Vector filter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Active filter variant
    pub kind: VectorFilterKind,
    /// Low-pass weight given to the newest sample
    pub alpha: f32,
    /// Kalman process noise Q
    pub process_noise: f32,
    /// Kalman measurement noise R
    pub measurement_noise: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            kind: VectorFilterKind::LowPass,
            alpha: 0.8,
            process_noise: 0.01,
            measurement_noise: 0.1,
        }
    }
}

/// Heading-angle smoothing settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    /// Fraction of the angular step applied when the device is still
    pub base_factor: f32,
    /// Factor increase per deg/s of recent angular velocity
    pub velocity_gain: f32,
    /// Upper bound for the adaptive factor
    pub max_factor: f32,
    /// Weight of the newest angular velocity in the running estimate
    pub velocity_weight: f32,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            base_factor: 0.3,
            velocity_gain: 0.002,
            max_factor: 0.9,
            velocity_weight: 0.5,
        }
    }
}

/// Accuracy estimator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracySettings {
    /// Entries kept in the heading history
    pub history_capacity: usize,
    /// Entries required before a score is produced
    pub min_history: usize,
    /// Most recent entries used for the score
    pub window: usize,
    /// Standard deviation (degrees) mapped to zero accuracy
    pub zero_accuracy_std_dev: f32,
}

impl Default for AccuracySettings {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            min_history: 5,
            window: 15,
            zero_accuracy_std_dev: 25.0,
        }
    }
}

/// Sample-to-sample variation limits for each quality class
///
/// Each array holds the excellent, good and fair limits in that order; any
/// larger variation is classified as poor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Magnetometer change limits (µT)
    pub magnetometer: [f32; 3],
    /// Accelerometer change limits (m/s²)
    pub accelerometer: [f32; 3],
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            magnetometer: [1.0, 3.0, 8.0],
            accelerometer: [0.2, 0.5, 1.5],
        }
    }
}

/// Complete pipeline configuration
///
/// # Example
/// ```
/// use compass_fusion::{CompassSettings, VectorFilterKind};
///
/// let settings = CompassSettings::from_json(r#"{ "filter": { "kind": "Kalman" } }"#).unwrap();
/// assert_eq!(settings.filter.kind, VectorFilterKind::Kalman);
/// assert_eq!(settings.filter.alpha, 0.8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassSettings {
    pub validation: ValidationSettings,
    pub calibration: CalibrationSettings,
    pub filter: FilterSettings,
    pub smoothing: SmoothingSettings,
    pub accuracy: AccuracySettings,
    pub quality: QualityThresholds,
}

impl CompassSettings {
    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the settings for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(CompassError::InvalidSettings(message.to_string()));

        let v = &self.validation;
        if !(v.noise_floor >= 0.0 && v.noise_floor < v.magnetometer_saturation) {
            return invalid("noise floor must be non-negative and below magnetometer saturation");
        }
        if !(v.accelerometer_saturation > 0.0 && v.gyroscope_saturation > 0.0) {
            return invalid("saturation bounds must be positive");
        }
        if !(v.typical_field.0 <= v.ideal_field.0
            && v.ideal_field.0 < v.ideal_field.1
            && v.ideal_field.1 <= v.typical_field.1)
        {
            return invalid("ideal field range must lie inside the typical field range");
        }

        let c = &self.calibration;
        if c.min_samples < 10 || c.min_samples > c.buffer_capacity {
            return invalid("calibration needs at least 10 samples and no more than the buffer capacity");
        }
        if !(c.std_dev_threshold > 0.0) {
            return invalid("calibration threshold must be positive");
        }

        let f = &self.filter;
        if !(f.alpha > 0.0 && f.alpha <= 1.0) {
            return invalid("low-pass alpha must be in (0, 1]");
        }
        if !(f.process_noise > 0.0 && f.measurement_noise > 0.0) {
            return invalid("Kalman noise terms must be positive");
        }

        let s = &self.smoothing;
        if !(s.base_factor > 0.0 && s.base_factor <= s.max_factor && s.max_factor <= 1.0) {
            return invalid("smoothing factors must satisfy 0 < base <= max <= 1");
        }
        if !(s.velocity_gain >= 0.0 && s.velocity_weight > 0.0 && s.velocity_weight <= 1.0) {
            return invalid("smoothing velocity terms out of range");
        }

        let a = &self.accuracy;
        if a.window == 0 || a.min_history == 0 || a.min_history > a.window {
            return invalid("accuracy window must be non-empty and hold min_history entries");
        }
        if a.history_capacity < a.window {
            return invalid("heading history must be at least as long as the accuracy window");
        }
        if !(a.zero_accuracy_std_dev > 0.0) {
            return invalid("zero-accuracy standard deviation must be positive");
        }

        let q = &self.quality;
        if !q.magnetometer.is_sorted() || !q.accelerometer.is_sorted() {
            return invalid("quality thresholds must be ascending");
        }

        Ok(())
    }
}
