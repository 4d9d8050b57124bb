//! Tilt-compensated magnetic heading

use nalgebra::Vector3;

use crate::math::{MIN_NORMALIZABLE, RAD_TO_DEG, Vector3Ext, normalize_degrees};
use crate::types::HeadingMethod;

/// Heading together with the formula that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingEstimate {
    /// Magnetic heading in degrees, `[0, 360)`
    pub degrees: f32,
    pub method: HeadingMethod,
}

/// Calculate the magnetic heading of a bias-corrected sample
///
/// The accelerometer supplies the gravity direction. The magnetometer is
/// projected onto the plane orthogonal to gravity and the heading is taken
/// from that horizontal component. When gravity cannot be normalized, or
/// the field is parallel to it, the planar formula on the raw x/y axes is
/// used instead.
///
/// # Arguments
/// * `accelerometer` - Accelerometer reading (any unit, only the direction is used)
/// * `magnetometer` - Bias-corrected magnetometer reading
///
/// # Returns
/// Heading in degrees within `[0, 360)`; the planar path guarantees a finite
/// result for any finite input.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::{HeadingMethod, calculate_heading};
///
/// let level = Vector3::new(0.0, 0.0, 9.8);
/// let estimate = calculate_heading(level, Vector3::new(20.0, 0.0, 10.0));
/// assert!(estimate.degrees < 1e-3);
/// assert_eq!(estimate.method, HeadingMethod::TiltCompensated);
/// ```
pub fn calculate_heading(accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) -> HeadingEstimate {
    match tilt_compensated(accelerometer, magnetometer) {
        Some(degrees) => HeadingEstimate {
            degrees,
            method: HeadingMethod::TiltCompensated,
        },
        None => HeadingEstimate {
            degrees: planar(magnetometer),
            method: HeadingMethod::Planar,
        },
    }
}

/// Magnetic heading in degrees, `[0, 360)`
pub fn compute_magnetic_heading(accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) -> f32 {
    calculate_heading(accelerometer, magnetometer).degrees
}

fn tilt_compensated(accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) -> Option<f32> {
    let gravity = accelerometer.try_normalize_min(MIN_NORMALIZABLE)?;
    let field = magnetometer.try_normalize_min(MIN_NORMALIZABLE)?;

    // Remove the component of the field along gravity
    let horizontal = field - gravity * field.dot(&gravity);
    if horizontal.norm() <= MIN_NORMALIZABLE {
        return None;
    }

    let heading = normalize_degrees((-horizontal.y).atan2(horizontal.x) * RAD_TO_DEG);
    heading.is_finite().then_some(heading)
}

fn planar(magnetometer: Vector3<f32>) -> f32 {
    let heading = normalize_degrees(magnetometer.y.atan2(magnetometer.x) * RAD_TO_DEG);
    if heading.is_finite() { heading } else { 0.0 }
}
