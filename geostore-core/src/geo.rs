//! Geographic primitives: points, great-circle distance and bounding boxes.
//!
//! Distances use a spherical earth with radius [`EARTH_RADIUS_KM`], the same
//! radius the store applies for spherical `$geoNear` queries, so distances
//! computed here agree with store-computed distances up to floating-point
//! noise.
//!
//! ```rust
//! use geostore_core::geo::GeoPoint;
//!
//! let bengaluru = GeoPoint::new(12.97, 77.59).unwrap();
//! let nearby = bengaluru.destination(90.0, 3.0);
//! assert!((bengaluru.distance_km(&nearby) - 3.0).abs() < 1e-6);
//!
//! assert!(GeoPoint::new(91.0, 0.0).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Mean earth radius used for spherical geometry, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6378.1;

/// Widening applied to bounding boxes, in degrees (~10 cm).
const BOX_SLACK_DEG: f64 = 1e-6;

/// A validated `(latitude, longitude)` pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(latitude: f64, longitude: f64) -> StoreResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(StoreError::invalid_query(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(StoreError::invalid_query(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another point, in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// The point reached by travelling `distance_km` along `bearing_deg`
    /// (clockwise from north).
    pub fn destination(&self, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let angular = distance_km / EARTH_RADIUS_KM;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        GeoPoint {
            latitude: lat2.to_degrees().clamp(-90.0, 90.0),
            longitude: normalize_longitude(lon2.to_degrees()),
        }
    }

    /// Conservative bounding box covering every point within `radius_km`.
    pub fn bounding_box(&self, radius_km: f64) -> BoundingBox {
        BoundingBox::around(self, radius_km)
    }
}

/// Haversine distance between two coordinate pairs, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Check a search radius.
pub fn validate_radius_km(radius_km: f64) -> StoreResult<f64> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(StoreError::invalid_query(format!(
            "radius must be positive and finite, got {}",
            radius_km
        )));
    }
    Ok(radius_km)
}

fn normalize_longitude(lon: f64) -> f64 {
    let mut lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if lon == -180.0 {
        lon = 180.0;
    }
    lon
}

/// Inclusive latitude/longitude rectangle used to pre-filter candidates.
///
/// A box that crosses the antimeridian is split into two longitude ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// Minimum latitude.
    pub min_lat: f64,
    /// Maximum latitude.
    pub max_lat: f64,
    /// One or two `(min, max)` longitude ranges.
    pub lon_ranges: Vec<(f64, f64)>,
}

impl BoundingBox {
    /// Compute the box around `center` for `radius_km`.
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let lat = center.latitude.to_radians();
        let lon = center.longitude.to_radians();
        let half_pi = std::f64::consts::FRAC_PI_2;

        let mut min_lat = lat - angular;
        let mut max_lat = lat + angular;

        let (min_lon, max_lon) = if min_lat > -half_pi && max_lat < half_pi {
            let ratio = (angular.sin() / lat.cos()).min(1.0);
            let delta_lon = ratio.asin();
            if ratio >= 1.0 {
                (-std::f64::consts::PI, std::f64::consts::PI)
            } else {
                (lon - delta_lon, lon + delta_lon)
            }
        } else {
            // A pole lies inside the circle; every longitude qualifies.
            min_lat = min_lat.max(-half_pi);
            max_lat = max_lat.min(half_pi);
            (-std::f64::consts::PI, std::f64::consts::PI)
        };

        let min_lat = (min_lat.to_degrees() - BOX_SLACK_DEG).max(-90.0);
        let max_lat = (max_lat.to_degrees() + BOX_SLACK_DEG).min(90.0);
        let min_lon = min_lon.to_degrees() - BOX_SLACK_DEG;
        let max_lon = max_lon.to_degrees() + BOX_SLACK_DEG;

        let lon_ranges = if max_lon - min_lon >= 360.0 {
            vec![(-180.0, 180.0)]
        } else if min_lon < -180.0 {
            vec![(min_lon + 360.0, 180.0), (-180.0, max_lon)]
        } else if max_lon > 180.0 {
            vec![(min_lon, 180.0), (-180.0, max_lon - 360.0)]
        } else {
            vec![(min_lon, max_lon)]
        };

        Self {
            min_lat,
            max_lat,
            lon_ranges,
        }
    }

    /// Whether the box wraps across the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lon_ranges.len() > 1
    }

    /// Whether a coordinate pair lies inside the box.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && self
                .lon_ranges
                .iter()
                .any(|(min, max)| longitude >= *min && longitude <= *max)
    }
}
