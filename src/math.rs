//! Vector and angle helpers shared by every pipeline stage

use nalgebra::Vector3;

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f32 = 9.806_65;

/// Magnitudes at or below this are treated as zero when normalizing
pub const MIN_NORMALIZABLE: f32 = 1e-6;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, or `None` when its magnitude is too small to divide by
    fn try_normalize_min(&self, min_magnitude: f32) -> Option<Vector3<f32>>;

    /// True when every component is finite
    fn all_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn try_normalize_min(&self, min_magnitude: f32) -> Option<Vector3<f32>> {
        let magnitude = self.norm();
        if magnitude > min_magnitude && magnitude.is_finite() {
            Some(*self / magnitude)
        } else {
            None
        }
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|component| component.is_finite())
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
///
/// Non-finite input is returned unchanged so callers can detect it.
pub fn normalize_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        // clears a negative zero
        wrapped + 0.0
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-180, 180]` degrees.
///
/// This is the one place the 0°/360° seam is handled; smoothing, variance
/// re-basing and anything else comparing two headings goes through here.
///
/// # Example
/// ```
/// use compass_fusion::shortest_angular_delta;
///
/// assert_eq!(shortest_angular_delta(359.0, 1.0), 2.0);
/// assert_eq!(shortest_angular_delta(1.0, 359.0), -2.0);
/// ```
pub fn shortest_angular_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}
