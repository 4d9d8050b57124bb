//! Compass Fusion - A sensor fusion library for tilt-compensated compass headings
//!
//! This library turns raw magnetometer and accelerometer samples into a
//! smoothed, declination-corrected heading with an accuracy estimate. Every
//! sample passes through a fixed pipeline: validation, hard-iron correction,
//! vector filtering, tilt-compensated heading, declination, heading smoothing
//! and accuracy scoring.
//!
//! # Features
//!
//! - Sample validation with saturation, noise-floor and field-strength grading
//! - Opportunistic hard-iron calibration from a rolling sample buffer
//! - Tilt compensation with a planar fallback for degenerate geometry
//! - Tiered declination lookup (regional table, regional approximation, zero)
//! - Low-pass or per-axis Kalman filtering of the magnetometer vector
//! - Velocity-adaptive heading smoothing that is correct across 0°/360°
//! - Thread-safe [`Compass`] orchestrator behind a single mutex
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use compass_fusion::{Compass, GeoCoordinate, RawSample};
//!
//! let compass = Compass::new();
//! compass.on_location_update(GeoCoordinate::new(35.68, 139.69));
//!
//! // Sensor readings
//! let magnetometer = Vector3::new(30.0, 0.0, -20.0); // µT
//! let accelerometer = Vector3::new(0.0, 0.0, 9.8);   // m/s²
//!
//! if let Some(result) = compass.on_raw_sample(RawSample::new(magnetometer, accelerometer, 0)) {
//!     println!("{:.1}° true ({:?})", result.true_heading, result.cardinal);
//! }
//! ```

mod accuracy;
pub mod calibration;
pub mod compass;
mod declination;
mod error;
pub mod filter;
mod math;
mod pipeline;
mod types;
mod validation;

// Re-export all public types and functions
pub use accuracy::{AccuracyEstimator, HeadingHistory, HeadingHistoryEntry, QualityAssessor};
pub use calibration::{CalibrationEngine, CalibrationProgress, CalibrationStatus};
pub use compass::{HeadingEstimate, calculate_heading, compute_magnetic_heading};
pub use declination::{
    ApproximationRegion, DEFAULT_MATCH_RADIUS, Declination, DeclinationSource, DeclinationTable,
    RegionalDeclination, true_heading,
};
pub use error::{CompassError, RejectReason, Result};
pub use filter::{HeadingSmoother, VectorFilter};
pub use math::{DEG_TO_RAD, RAD_TO_DEG, STANDARD_GRAVITY, Vector3Ext, normalize_degrees, shortest_angular_delta};
pub use pipeline::{Compass, HeadingSink, PipelineStats};
pub use types::*;
pub use validation::{SampleValidator, ValidationResult};
