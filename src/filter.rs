//! Noise filtering for the magnetometer vector and the heading angle
//!
//! Two vector filters are available (exponential low-pass and a scalar
//! Kalman filter per axis); exactly one is active in a pipeline. Heading
//! smoothing runs on the angle afterwards and is independent of them.

use nalgebra::Vector3;

use crate::math::{normalize_degrees, shortest_angular_delta};
use crate::types::{FilterSettings, SmoothingSettings, VectorFilterKind};

/// Initial Kalman error covariance after the first measurement
const INITIAL_COVARIANCE: f32 = 1.0;

/// One exponential low-pass step: `alpha * new + (1 - alpha) * previous`
///
/// With no previous value the new one is returned unchanged.
pub fn low_pass(alpha: f32, new: Vector3<f32>, previous: Option<Vector3<f32>>) -> Vector3<f32> {
    match previous {
        Some(previous) => new * alpha + previous * (1.0 - alpha),
        None => new,
    }
}

/// Exponential low-pass vector filter
#[derive(Debug, Clone, Copy)]
pub struct LowPassFilter {
    alpha: f32,
    previous: Option<Vector3<f32>>,
}

impl LowPassFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, previous: None }
    }

    /// Filter a new reading and remember the result
    pub fn update(&mut self, value: Vector3<f32>) -> Vector3<f32> {
        let filtered = low_pass(self.alpha, value, self.previous);
        self.previous = Some(filtered);
        filtered
    }

    /// Move the stored estimate by `delta`
    pub fn shift(&mut self, delta: Vector3<f32>) {
        if let Some(previous) = &mut self.previous {
            *previous += delta;
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Scalar Kalman estimate and its error covariance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanState {
    pub estimate: f32,
    pub covariance: f32,
}

/// One scalar Kalman step
///
/// The first measurement initializes the estimate with covariance 1.0.
/// Afterwards the covariance is inflated by `process_noise`, the gain
/// `K = P / (P + R)` blends the measurement in, and `P` becomes `(1 - K) P`.
///
/// # Example
/// ```
/// use compass_fusion::filter::kalman_step;
///
/// let first = kalman_step(0.01, 0.1, 5.0, None);
/// assert_eq!(first.estimate, 5.0);
/// let second = kalman_step(0.01, 0.1, 6.0, Some(first));
/// assert!(second.estimate > 5.0 && second.estimate < 6.0);
/// assert!(second.covariance < first.covariance);
/// ```
pub fn kalman_step(
    process_noise: f32,
    measurement_noise: f32,
    measurement: f32,
    previous: Option<KalmanState>,
) -> KalmanState {
    let Some(previous) = previous else {
        return KalmanState {
            estimate: measurement,
            covariance: INITIAL_COVARIANCE,
        };
    };

    let predicted_covariance = previous.covariance + process_noise;
    let gain = predicted_covariance / (predicted_covariance + measurement_noise);

    KalmanState {
        estimate: previous.estimate + gain * (measurement - previous.estimate),
        covariance: (1.0 - gain) * predicted_covariance,
    }
}

/// One-dimensional Kalman filter
#[derive(Debug, Clone, Copy)]
pub struct ScalarKalman {
    process_noise: f32,
    measurement_noise: f32,
    state: Option<KalmanState>,
}

impl ScalarKalman {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            process_noise,
            measurement_noise,
            state: None,
        }
    }

    pub fn update(&mut self, measurement: f32) -> f32 {
        let state = kalman_step(self.process_noise, self.measurement_noise, measurement, self.state);
        self.state = Some(state);
        state.estimate
    }

    pub fn state(&self) -> Option<KalmanState> {
        self.state
    }

    /// Move the estimate by `delta`, keeping its covariance
    pub fn shift(&mut self, delta: f32) {
        if let Some(state) = &mut self.state {
            state.estimate += delta;
        }
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Independent scalar Kalman filter on each axis
#[derive(Debug, Clone, Copy)]
pub struct VectorKalman {
    axes: [ScalarKalman; 3],
}

impl VectorKalman {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            axes: [ScalarKalman::new(process_noise, measurement_noise); 3],
        }
    }

    pub fn update(&mut self, value: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            self.axes[0].update(value.x),
            self.axes[1].update(value.y),
            self.axes[2].update(value.z),
        )
    }

    /// Error covariance per axis, `None` before the first update
    pub fn covariance(&self) -> Option<Vector3<f32>> {
        let [x, y, z] = self.axes.map(|axis| axis.state());
        Some(Vector3::new(x?.covariance, y?.covariance, z?.covariance))
    }

    pub fn shift(&mut self, delta: Vector3<f32>) {
        for (axis, delta) in self.axes.iter_mut().zip(delta.iter()) {
            axis.shift(*delta);
        }
    }

    pub fn reset(&mut self) {
        self.axes.iter_mut().for_each(ScalarKalman::reset);
    }
}

/// The active vector noise filter
#[derive(Debug, Clone, Copy)]
pub enum VectorFilter {
    LowPass(LowPassFilter),
    Kalman(VectorKalman),
}

impl VectorFilter {
    pub fn new(settings: &FilterSettings) -> Self {
        match settings.kind {
            VectorFilterKind::LowPass => VectorFilter::LowPass(LowPassFilter::new(settings.alpha)),
            VectorFilterKind::Kalman => VectorFilter::Kalman(VectorKalman::new(
                settings.process_noise,
                settings.measurement_noise,
            )),
        }
    }

    pub fn update(&mut self, value: Vector3<f32>) -> Vector3<f32> {
        match self {
            VectorFilter::LowPass(filter) => filter.update(value),
            VectorFilter::Kalman(filter) => filter.update(value),
        }
    }

    /// Re-express the filter state after the input gained a constant `delta`
    ///
    /// Used when a new calibration offset takes effect, so filtered output
    /// never mixes readings corrected with the old and new offsets.
    pub fn shift(&mut self, delta: Vector3<f32>) {
        match self {
            VectorFilter::LowPass(filter) => filter.shift(delta),
            VectorFilter::Kalman(filter) => filter.shift(delta),
        }
    }

    pub fn reset(&mut self) {
        match self {
            VectorFilter::LowPass(filter) => filter.reset(),
            VectorFilter::Kalman(filter) => filter.reset(),
        }
    }
}

/// Adaptive smoothing of a heading angle across the 0°/360° seam
///
/// Each step moves the previous heading toward the new one along the
/// shortest arc. The fraction of the arc applied grows with the recent
/// angular velocity, so a turning device tracks quickly while a still one
/// stays steady.
#[derive(Debug, Clone, Copy)]
pub struct HeadingSmoother {
    settings: SmoothingSettings,
    previous: Option<(f32, u64)>,
    /// Running angular velocity estimate in deg/s
    angular_velocity: f32,
}

impl HeadingSmoother {
    pub fn new(settings: SmoothingSettings) -> Self {
        Self {
            settings,
            previous: None,
            angular_velocity: 0.0,
        }
    }

    /// Smooth a new heading observed at `timestamp_ms`
    pub fn update(&mut self, heading: f32, timestamp_ms: u64) -> f32 {
        let Some((previous, previous_timestamp)) = self.previous else {
            let heading = normalize_degrees(heading);
            self.previous = Some((heading, timestamp_ms));
            return heading;
        };

        let delta = shortest_angular_delta(previous, heading);
        let elapsed = timestamp_ms.saturating_sub(previous_timestamp) as f32 / 1000.0;
        if elapsed > 0.0 {
            let weight = self.settings.velocity_weight;
            self.angular_velocity = weight * (delta.abs() / elapsed) + (1.0 - weight) * self.angular_velocity;
        }

        let factor = self.factor();
        let smoothed = normalize_degrees(previous + delta * factor);
        self.previous = Some((smoothed, timestamp_ms));
        smoothed
    }

    /// Fraction of the angular step currently applied
    pub fn factor(&self) -> f32 {
        let s = &self.settings;
        (s.base_factor + s.velocity_gain * self.angular_velocity).min(s.max_factor)
    }

    /// Last smoothed heading
    pub fn heading(&self) -> Option<f32> {
        self.previous.map(|(heading, _)| heading)
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.angular_velocity = 0.0;
    }
}

/// Stateless form of one smoothing step with a fixed factor
///
/// # Example
/// ```
/// use compass_fusion::filter::smooth_heading;
///
/// // Moves forward through north instead of back through south
/// let smoothed = smooth_heading(1.0, 359.0, 0.5);
/// assert!((smoothed - 0.0).abs() < 1e-4);
/// ```
pub fn smooth_heading(new_heading: f32, previous_heading: f32, factor: f32) -> f32 {
    normalize_degrees(previous_heading + shortest_angular_delta(previous_heading, new_heading) * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_pass_first_sample_passes_through() {
        let mut filter = LowPassFilter::new(0.8);
        let value = Vector3::new(10.0, -5.0, 3.0);
        assert_eq!(filter.update(value), value);
    }

    #[test]
    fn test_low_pass_converges_within_twenty_steps() {
        let mut filter = LowPassFilter::new(0.8);
        filter.update(Vector3::zeros());

        let target = Vector3::new(30.0, -12.0, 40.0);
        let mut steps = 0;
        let mut output = Vector3::zeros();
        while steps < 20 {
            output = filter.update(target);
            steps += 1;
            if (output - target).norm() < 1e-3 {
                break;
            }
        }

        assert!((output - target).norm() < 1e-3, "after {steps} steps: {output:?}");
        assert!(steps <= 20);
    }

    #[test]
    fn test_low_pass_blend() {
        let blended = low_pass(0.8, Vector3::new(10.0, 0.0, 0.0), Some(Vector3::zeros()));
        assert!((blended.x - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_kalman_first_measurement_initializes() {
        let mut kalman = ScalarKalman::new(0.01, 0.1);
        assert_eq!(kalman.update(42.0), 42.0);
        assert_eq!(
            kalman.state(),
            Some(KalmanState {
                estimate: 42.0,
                covariance: 1.0
            })
        );
    }

    #[test]
    fn test_kalman_covariance_non_increasing() {
        let mut kalman = ScalarKalman::new(0.01, 0.1);
        let mut previous = f32::INFINITY;

        for i in 0..100 {
            kalman.update(20.0 + if i % 2 == 0 { 0.3 } else { -0.3 });
            let covariance = kalman.state().map(|s| s.covariance).unwrap_or_default();
            assert!(covariance <= previous + 1e-7, "step {i}: {covariance} > {previous}");
            previous = covariance;
        }

        // Steady state of P = (1 - K)(P + Q)
        assert!(previous > 0.0 && previous < 0.05);
    }

    #[test]
    fn test_vector_kalman_tracks_constant() {
        let mut kalman = VectorKalman::new(0.01, 0.1);
        assert!(kalman.covariance().is_none());

        let target = Vector3::new(25.0, -8.0, 40.0);
        kalman.update(Vector3::zeros());
        let mut output = Vector3::zeros();
        for _ in 0..50 {
            output = kalman.update(target);
        }
        assert!((output - target).norm() < 0.1);
        assert!(kalman.covariance().is_some());
    }

    #[test]
    fn test_vector_filter_selects_variant() {
        let settings = FilterSettings {
            kind: VectorFilterKind::Kalman,
            ..Default::default()
        };
        assert!(matches!(VectorFilter::new(&settings), VectorFilter::Kalman(_)));
        assert!(matches!(VectorFilter::new(&FilterSettings::default()), VectorFilter::LowPass(_)));
    }

    #[test]
    fn test_shift_rebases_filter_state() {
        let bias = Vector3::new(30.0, 0.0, -20.0);
        let field = Vector3::new(0.0, -30.0, -10.0);

        let mut low_pass = VectorFilter::new(&FilterSettings::default());
        low_pass.update(bias);
        low_pass.shift(-bias);
        assert!((low_pass.update(field) - field * 0.8).norm() < 1e-4);

        let mut kalman = VectorFilter::new(&FilterSettings {
            kind: VectorFilterKind::Kalman,
            ..Default::default()
        });
        for _ in 0..20 {
            kalman.update(bias);
        }
        kalman.shift(-bias);
        let output = kalman.update(field);
        assert!(output.norm() > 0.0);
        assert!(output.normalize().cross(&field.normalize()).norm() < 1e-3);

        // Shifting an empty filter is a no-op
        let mut fresh = VectorFilter::new(&FilterSettings::default());
        fresh.shift(-bias);
        assert_eq!(fresh.update(field), field);
    }

    #[test]
    fn test_smoothing_crosses_north_forward() {
        let mut smoother = HeadingSmoother::new(SmoothingSettings::default());
        assert_eq!(smoother.update(359.0, 0), 359.0);

        let smoothed = smoother.update(1.0, 100);
        let step = shortest_angular_delta(359.0, smoothed);
        assert!(step > 0.0 && step <= 2.0, "smoothed to {smoothed}");
    }

    #[test]
    fn test_smoothing_sequence_never_jumps() {
        let mut smoother = HeadingSmoother::new(SmoothingSettings::default());
        let inputs = [350.0, 353.0, 356.0, 359.0, 2.0, 5.0, 8.0, 11.0];
        let mut previous = smoother.update(inputs[0], 0);

        for (i, &input) in inputs.iter().enumerate().skip(1) {
            let smoothed = smoother.update(input, i as u64 * 100);
            let step = shortest_angular_delta(previous, smoothed);
            assert!((0.0..=4.0).contains(&step), "step {step} at {input}");
            assert!((0.0..360.0).contains(&smoothed));
            previous = smoothed;
        }
    }

    #[test]
    fn test_smoothing_factor_grows_with_velocity_and_caps() {
        let mut smoother = HeadingSmoother::new(SmoothingSettings::default());
        assert_eq!(smoother.factor(), 0.3);

        smoother.update(0.0, 0);
        for i in 1..20 {
            smoother.update((i * 90 % 360) as f32, i * 100);
        }
        assert_eq!(smoother.factor(), 0.9);
    }

    #[test]
    fn test_stateless_smooth_heading() {
        assert!((smooth_heading(10.0, 350.0, 0.5) - 0.0).abs() < 1e-4);
        assert!((smooth_heading(350.0, 10.0, 0.5) - 0.0).abs() < 1e-4);
        assert!((smooth_heading(90.0, 80.0, 1.0) - 90.0).abs() < 1e-4);
    }
}
