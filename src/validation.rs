//! Raw sample validation
//!
//! Runs before anything touches pipeline state. A rejected sample never
//! reaches calibration, filtering or the heading history.

use nalgebra::Vector3;

use crate::error::RejectReason;
use crate::math::Vector3Ext;
use crate::types::{RawSample, SensorKind, ValidationSettings};

/// Quality credit for a field inside the typical but outside the ideal range
const TYPICAL_FIELD_CREDIT: f32 = 0.8;
/// Quality credit at the noise floor, rising linearly to the typical range
const NOISE_FLOOR_CREDIT: f32 = 0.3;
/// Quality credit for a field far above the typical range
const STRONG_FIELD_CREDIT: f32 = 0.4;
/// Multiplier for each axis that reads as dead
const DEAD_AXIS_PENALTY: f32 = 0.9;
/// Multiplier for each axis close to saturation
const NEAR_SATURATION_PENALTY: f32 = 0.5;

/// Outcome of validating one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
    /// Whether the sample may enter the pipeline
    pub ok: bool,
    /// Why the sample was refused
    pub reason: Option<RejectReason>,
    /// Reading quality in `[0, 1]`; zero for rejected samples
    pub quality_hint: f32,
}

impl ValidationResult {
    fn accepted(quality_hint: f32) -> Self {
        Self {
            ok: true,
            reason: None,
            quality_hint,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            quality_hint: 0.0,
        }
    }

    /// Convert into a `Result` carrying the quality hint
    pub fn into_result(self) -> Result<f32, RejectReason> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(self.quality_hint),
        }
    }
}

/// Stateless plausibility checks for raw samples
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::{RawSample, SampleValidator};
///
/// let validator = SampleValidator::default();
/// let sample = RawSample::new(Vector3::new(25.5, -12.3, 8.7), Vector3::new(0.0, 0.0, 9.8), 0);
/// assert!(validator.validate(&sample).ok);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleValidator {
    settings: ValidationSettings,
}

impl SampleValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Validate a sample and grade the magnetometer reading
    pub fn validate(&self, sample: &RawSample) -> ValidationResult {
        match self.check(sample) {
            Ok(magnitude) => ValidationResult::accepted(self.quality_hint(sample.magnetometer, magnitude)),
            Err(reason) => ValidationResult::rejected(reason),
        }
    }

    fn check(&self, sample: &RawSample) -> Result<f32, RejectReason> {
        let s = &self.settings;
        check_axes(SensorKind::Magnetometer, sample.magnetometer, s.magnetometer_saturation)?;
        check_axes(SensorKind::Accelerometer, sample.accelerometer, s.accelerometer_saturation)?;
        if let Some(gyroscope) = sample.gyroscope {
            check_axes(SensorKind::Gyroscope, gyroscope, s.gyroscope_saturation)?;
        }

        let magnitude = sample.magnetometer.norm();
        if magnitude < s.noise_floor {
            return Err(RejectReason::BelowNoiseFloor {
                magnitude,
                floor: s.noise_floor,
            });
        }
        Ok(magnitude)
    }

    fn quality_hint(&self, magnetometer: Vector3<f32>, magnitude: f32) -> f32 {
        let s = &self.settings;
        let (typical_min, typical_max) = s.typical_field;
        let (ideal_min, ideal_max) = s.ideal_field;

        let mut quality = if (ideal_min..=ideal_max).contains(&magnitude) {
            1.0
        } else if (typical_min..=typical_max).contains(&magnitude) {
            TYPICAL_FIELD_CREDIT
        } else if magnitude < typical_min {
            let span = (typical_min - s.noise_floor).max(f32::EPSILON);
            let t = ((magnitude - s.noise_floor) / span).clamp(0.0, 1.0);
            NOISE_FLOOR_CREDIT + (TYPICAL_FIELD_CREDIT - NOISE_FLOOR_CREDIT) * t
        } else {
            STRONG_FIELD_CREDIT
        };

        let near_saturation = s.magnetometer_saturation * s.near_saturation_ratio;
        for axis in magnetometer.iter() {
            if axis.abs() < s.dead_axis_threshold {
                quality *= DEAD_AXIS_PENALTY;
            }
            if axis.abs() >= near_saturation {
                quality *= NEAR_SATURATION_PENALTY;
            }
        }

        quality.clamp(0.0, 1.0)
    }
}

fn check_axes(sensor: SensorKind, reading: Vector3<f32>, limit: f32) -> Result<(), RejectReason> {
    if !reading.all_finite() {
        return Err(RejectReason::NonFinite { sensor });
    }
    match reading.iter().find(|axis| axis.abs() > limit) {
        Some(&value) => Err(RejectReason::Saturated { sensor, value, limit }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f32, y: f32, z: f32) -> RawSample {
        RawSample::new(Vector3::new(x, y, z), Vector3::new(0.0, 0.0, 9.8), 0)
    }

    #[test]
    fn test_rejects_non_finite_axis() {
        let validator = SampleValidator::default();
        let result = validator.validate(&sample(f32::NAN, 0.0, 0.0));
        assert!(!result.ok);
        assert_eq!(
            result.reason,
            Some(RejectReason::NonFinite {
                sensor: SensorKind::Magnetometer
            })
        );

        let result = validator.validate(&sample(f32::INFINITY, 30.0, 0.0));
        assert!(!result.ok);
    }

    #[test]
    fn test_rejects_saturated_axis() {
        let validator = SampleValidator::default();
        let result = validator.validate(&sample(300.0, 0.0, 0.0));
        assert!(!result.ok);
        assert!(matches!(
            result.reason,
            Some(RejectReason::Saturated { value, .. }) if value == 300.0
        ));
    }

    #[test]
    fn test_accepts_typical_reading() {
        let validator = SampleValidator::default();
        let result = validator.validate(&sample(25.5, -12.3, 8.7));
        assert!(result.ok);
        assert!(result.reason.is_none());
        assert!((result.quality_hint - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_below_noise_floor() {
        let validator = SampleValidator::default();
        let result = validator.validate(&sample(2.0, 1.0, 1.0));
        assert!(matches!(result.reason, Some(RejectReason::BelowNoiseFloor { .. })));
        assert_eq!(result.quality_hint, 0.0);
    }

    #[test]
    fn test_rejects_bad_accelerometer_and_gyroscope() {
        let validator = SampleValidator::default();

        let bad_accel = RawSample::new(Vector3::new(30.0, 0.0, 0.0), Vector3::new(0.0, f32::NAN, 9.8), 0);
        assert_eq!(
            validator.validate(&bad_accel).reason,
            Some(RejectReason::NonFinite {
                sensor: SensorKind::Accelerometer
            })
        );

        let bad_gyro = sample(30.0, 0.0, 0.0).with_gyroscope(Vector3::new(0.0, 0.0, 100.0));
        assert!(matches!(
            validator.validate(&bad_gyro).reason,
            Some(RejectReason::Saturated {
                sensor: SensorKind::Gyroscope,
                ..
            })
        ));
    }

    #[test]
    fn test_quality_hint_penalties() {
        let validator = SampleValidator::default();

        let ideal = validator.validate(&sample(30.0, 20.0, 10.0)).quality_hint;
        let weak = validator.validate(&sample(8.0, 4.0, 2.0)).quality_hint;
        let dead_axes = validator.validate(&sample(30.0, 0.0, 0.0)).quality_hint;
        let near_saturation = validator.validate(&sample(190.0, 0.0, 10.0)).quality_hint;

        assert_eq!(ideal, 1.0);
        assert!(weak < ideal && weak > 0.0);
        assert!(dead_axes < ideal);
        assert!(near_saturation < weak);
    }

    #[test]
    fn test_into_result() {
        let validator = SampleValidator::default();
        assert!(validator.validate(&sample(25.0, 0.0, 30.0)).into_result().is_ok());
        assert!(validator.validate(&sample(f32::NAN, 0.0, 0.0)).into_result().is_err());
    }
}
