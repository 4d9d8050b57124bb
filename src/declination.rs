//! Magnetic declination lookup
//!
//! Declination is resolved in three tiers: the nearest known regional sample
//! within a search radius, a linear longitude approximation inside a broad
//! bounding box, and finally zero. A lookup never fails.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::math::normalize_degrees;
use crate::types::GeoCoordinate;

/// Regional samples within this many degrees (lat/lon Euclidean) are used directly
pub const DEFAULT_MATCH_RADIUS: f64 = 5.0;

/// Which tier produced a declination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeclinationSource {
    /// Nearest regional table entry
    Regional,
    /// Linear approximation inside a known region
    Approximation,
    /// No data; zero correction
    #[default]
    Default,
}

/// Declination for a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Declination {
    /// Degrees, east of true north positive
    pub value: f32,
    /// Expected error in degrees
    pub accuracy: f32,
    pub source: DeclinationSource,
}

impl Declination {
    /// Declination used before any location is known
    pub const NONE: Declination = Declination {
        value: 0.0,
        accuracy: 0.0,
        source: DeclinationSource::Default,
    };
}

/// A surveyed declination at a known place
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionalDeclination {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees, east positive
    pub declination: f32,
    /// Expected error in degrees
    pub accuracy: f32,
}

/// A bounding box where declination varies roughly linearly with longitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproximationRegion {
    pub name: &'static str,
    pub latitude_range: (f64, f64),
    pub longitude_range: (f64, f64),
    /// Longitude at which declination is zero
    pub agonic_longitude: f64,
    /// Declination change per degree of longitude
    pub slope: f64,
    /// Expected error in degrees
    pub accuracy: f32,
}

impl ApproximationRegion {
    fn contains(&self, coordinate: &GeoCoordinate) -> bool {
        let (lat_min, lat_max) = self.latitude_range;
        let (lon_min, lon_max) = self.longitude_range;
        (lat_min..=lat_max).contains(&coordinate.latitude)
            && (lon_min..=lon_max).contains(&coordinate.longitude)
    }

    fn declination_at(&self, longitude: f64) -> f32 {
        (self.slope * (longitude - self.agonic_longitude)) as f32
    }
}

const REGIONAL_SAMPLES: &[RegionalDeclination] = &[
    RegionalDeclination { name: "New York", latitude: 40.71, longitude: -74.01, declination: -12.9, accuracy: 0.5 },
    RegionalDeclination { name: "Chicago", latitude: 41.88, longitude: -87.63, declination: -3.4, accuracy: 0.5 },
    RegionalDeclination { name: "Denver", latitude: 39.74, longitude: -104.99, declination: 7.6, accuracy: 0.5 },
    RegionalDeclination { name: "Los Angeles", latitude: 34.05, longitude: -118.24, declination: 11.5, accuracy: 0.5 },
    RegionalDeclination { name: "Seattle", latitude: 47.61, longitude: -122.33, declination: 15.0, accuracy: 0.5 },
    RegionalDeclination { name: "Miami", latitude: 25.76, longitude: -80.19, declination: -6.8, accuracy: 0.5 },
    RegionalDeclination { name: "Sao Paulo", latitude: -23.55, longitude: -46.63, declination: -21.9, accuracy: 0.5 },
    RegionalDeclination { name: "London", latitude: 51.51, longitude: -0.13, declination: 1.0, accuracy: 0.5 },
    RegionalDeclination { name: "Paris", latitude: 48.86, longitude: 2.35, declination: 1.8, accuracy: 0.5 },
    RegionalDeclination { name: "Berlin", latitude: 52.52, longitude: 13.40, declination: 4.6, accuracy: 0.5 },
    RegionalDeclination { name: "Istanbul", latitude: 41.01, longitude: 28.98, declination: 6.0, accuracy: 0.5 },
    RegionalDeclination { name: "Moscow", latitude: 55.76, longitude: 37.62, declination: 12.0, accuracy: 0.5 },
    RegionalDeclination { name: "Cape Town", latitude: -33.92, longitude: 18.42, declination: -25.5, accuracy: 0.5 },
    RegionalDeclination { name: "Dubai", latitude: 25.20, longitude: 55.27, declination: 2.3, accuracy: 0.5 },
    RegionalDeclination { name: "Mumbai", latitude: 19.08, longitude: 72.88, declination: -0.6, accuracy: 0.5 },
    RegionalDeclination { name: "Beijing", latitude: 39.90, longitude: 116.41, declination: -7.6, accuracy: 0.5 },
    RegionalDeclination { name: "Tokyo", latitude: 35.68, longitude: 139.69, declination: -7.9, accuracy: 0.5 },
    RegionalDeclination { name: "Sydney", latitude: -33.87, longitude: 151.21, declination: 12.9, accuracy: 0.5 },
];

const APPROXIMATION_REGIONS: &[ApproximationRegion] = &[
    ApproximationRegion {
        name: "Contiguous United States",
        latitude_range: (24.0, 50.0),
        longitude_range: (-125.0, -66.0),
        agonic_longitude: -96.0,
        slope: -0.58,
        accuracy: 3.0,
    },
    ApproximationRegion {
        name: "Europe",
        latitude_range: (35.0, 71.0),
        longitude_range: (-10.0, 40.0),
        agonic_longitude: -3.0,
        slope: 0.3,
        accuracy: 2.5,
    },
    ApproximationRegion {
        name: "East Asia",
        latitude_range: (20.0, 50.0),
        longitude_range: (100.0, 145.0),
        agonic_longitude: 10.0,
        slope: -0.06,
        accuracy: 3.0,
    },
    ApproximationRegion {
        name: "Australia",
        latitude_range: (-44.0, -10.0),
        longitude_range: (112.0, 154.0),
        agonic_longitude: 119.0,
        slope: 0.4,
        accuracy: 3.0,
    },
];

/// Tiered declination lookup
///
/// # Example
/// ```
/// use compass_fusion::{DeclinationSource, DeclinationTable, GeoCoordinate};
///
/// let table = DeclinationTable::default();
/// let london = table.declination_for(&GeoCoordinate::new(51.51, -0.13));
/// assert_eq!(london.source, DeclinationSource::Regional);
/// assert_eq!(london.value, 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct DeclinationTable {
    samples: Vec<RegionalDeclination>,
    regions: Vec<ApproximationRegion>,
    match_radius: f64,
}

impl DeclinationTable {
    /// Build a table from custom samples and regions
    pub fn new(
        samples: Vec<RegionalDeclination>,
        regions: Vec<ApproximationRegion>,
        match_radius: f64,
    ) -> Self {
        Self {
            samples,
            regions,
            match_radius,
        }
    }

    /// Resolve the declination for a coordinate
    pub fn declination_for(&self, coordinate: &GeoCoordinate) -> Declination {
        if let Some((entry, distance)) = self.nearest_sample(coordinate) {
            if distance <= self.match_radius {
                debug!("declination from {} ({distance:.2}° away)", entry.name);
                return Declination {
                    value: entry.declination,
                    accuracy: entry.accuracy,
                    source: DeclinationSource::Regional,
                };
            }
        }

        if let Some(region) = self.regions.iter().find(|region| region.contains(coordinate)) {
            debug!("declination approximated for region {}", region.name);
            return Declination {
                value: region.declination_at(coordinate.longitude),
                accuracy: region.accuracy,
                source: DeclinationSource::Approximation,
            };
        }

        Declination::NONE
    }

    fn nearest_sample(&self, coordinate: &GeoCoordinate) -> Option<(&RegionalDeclination, f64)> {
        self.samples
            .iter()
            .map(|entry| {
                let d_lat = entry.latitude - coordinate.latitude;
                let d_lon = entry.longitude - coordinate.longitude;
                (entry, (d_lat * d_lat + d_lon * d_lon).sqrt())
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Default for DeclinationTable {
    fn default() -> Self {
        Self::new(
            REGIONAL_SAMPLES.to_vec(),
            APPROXIMATION_REGIONS.to_vec(),
            DEFAULT_MATCH_RADIUS,
        )
    }
}

/// Convert a magnetic heading to a true heading
///
/// # Example
/// ```
/// use compass_fusion::true_heading;
///
/// assert_eq!(true_heading(359.0, 2.0), 1.0);
/// assert_eq!(true_heading(1.0, -2.0), 359.0);
/// ```
pub fn true_heading(magnetic_heading: f32, declination: f32) -> f32 {
    normalize_degrees(magnetic_heading + declination + 360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_regional_match() {
        let table = DeclinationTable::default();
        let result = table.declination_for(&GeoCoordinate::new(35.68, 139.69));
        assert_eq!(result.source, DeclinationSource::Regional);
        assert_eq!(result.value, -7.9);
        assert_eq!(result.accuracy, 0.5);
    }

    #[test]
    fn test_nearby_coordinate_uses_nearest_entry() {
        let table = DeclinationTable::default();
        // Yokohama is well within the Tokyo radius
        let result = table.declination_for(&GeoCoordinate::new(35.44, 139.64));
        assert_eq!(result.source, DeclinationSource::Regional);
        assert_eq!(result.value, -7.9);
    }

    #[test]
    fn test_approximation_inside_region() {
        let table = DeclinationTable::default();
        // Kansas City is more than 5° from every table entry but inside the US box
        let result = table.declination_for(&GeoCoordinate::new(39.1, -94.6));
        assert_eq!(result.source, DeclinationSource::Approximation);
        assert!((result.value - (-0.58 * 1.4) as f32).abs() < 1e-3);
        assert_eq!(result.accuracy, 3.0);
    }

    #[test]
    fn test_default_far_from_everything() {
        let table = DeclinationTable::default();
        let result = table.declination_for(&GeoCoordinate::new(0.0, -150.0));
        assert_eq!(result.source, DeclinationSource::Default);
        assert_eq!(result.value, 0.0);
    }

    #[test]
    fn test_empty_table_defaults() {
        let table = DeclinationTable::new(Vec::new(), Vec::new(), DEFAULT_MATCH_RADIUS);
        assert_eq!(table.declination_for(&GeoCoordinate::new(51.5, 0.0)), Declination::NONE);
    }

    #[test]
    fn test_true_heading_wraps() {
        assert_eq!(true_heading(0.0, 0.5), 0.5);
        assert!((true_heading(180.0, -12.9) - 167.1).abs() < 1e-3);
        assert!((true_heading(359.5, 1.0) - 0.5).abs() < 1e-4);
        assert!((true_heading(5.0, -10.0) - 355.0).abs() < 1e-4);
    }
}
