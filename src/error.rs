//! Error types for the compass pipeline
//!
//! Nothing here is fatal to the stream. A sample that produces any of these
//! errors is dropped by [`Compass`](crate::Compass) and the next sample is
//! processed as usual.

use thiserror::Error;

use crate::types::SensorKind;

/// Result type for compass operations
pub type Result<T> = core::result::Result<T, CompassError>;

/// Why the sample validator refused a reading
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// An axis is NaN or infinite
    #[error("{sensor} reading contains a non-finite axis")]
    NonFinite {
        /// Sensor that produced the bad axis
        sensor: SensorKind,
    },

    /// An axis is beyond the sensor's saturation bound
    #[error("{sensor} axis value {value} exceeds saturation limit ±{limit}")]
    Saturated {
        /// Sensor that saturated
        sensor: SensorKind,
        /// Offending axis value
        value: f32,
        /// Configured saturation bound
        limit: f32,
    },

    /// Field magnitude too small to be a connected magnetometer
    #[error("magnetic field {magnitude} µT below noise floor {floor} µT")]
    BelowNoiseFloor {
        /// Measured field magnitude
        magnitude: f32,
        /// Configured noise floor
        floor: f32,
    },
}

/// Errors raised inside the compass pipeline
#[derive(Error, Debug)]
pub enum CompassError {
    /// Sample failed validation
    #[error("sample rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Heading computation produced a non-finite angle
    #[error("heading computation produced a non-finite value")]
    NonFiniteHeading,

    /// Location update outside the valid coordinate range
    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Latitude in degrees
        latitude: f64,
        /// Longitude in degrees
        longitude: f64,
    },

    /// Settings failed their consistency check
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings could not be parsed or serialized
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_converts_into_compass_error() {
        let reason = RejectReason::BelowNoiseFloor {
            magnitude: 1.0,
            floor: 5.0,
        };
        let error: CompassError = reason.into();

        assert!(matches!(error, CompassError::Rejected(RejectReason::BelowNoiseFloor { .. })));
        assert_eq!(
            error.to_string(),
            "sample rejected: magnetic field 1 µT below noise floor 5 µT"
        );
    }

    #[test]
    fn test_saturation_message_names_sensor() {
        let reason = RejectReason::Saturated {
            sensor: SensorKind::Magnetometer,
            value: 300.0,
            limit: 200.0,
        };
        assert_eq!(
            reason.to_string(),
            "magnetometer axis value 300 exceeds saturation limit ±200"
        );
    }
}
