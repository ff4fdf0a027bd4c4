//! Great-circle distance and the office radius check used on check-in.

use tracing::warn;

/// Mean Earth radius.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("office radius {0} must be a positive number of meters")]
    InvalidRadius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Haversine distance in meters between two points given in degrees.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

pub fn is_within_radius(point: Coordinates, office_center: Coordinates, radius_meters: f64) -> bool {
    distance(
        point.latitude,
        point.longitude,
        office_center.latitude,
        office_center.longitude,
    ) <= radius_meters
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfficeLocation {
    pub center: Coordinates,
    pub radius_meters: f64,
}

impl OfficeLocation {
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Result<Self, GeoError> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeoError::InvalidRadius(radius_meters));
        }
        Ok(Self {
            center: Coordinates::new(latitude, longitude)?,
            radius_meters,
        })
    }
}

/// Office geofence. When the office cannot be evaluated every point counts as inside.
#[derive(Debug, Clone)]
pub struct GeoFence {
    office: Result<OfficeLocation, String>,
}

impl GeoFence {
    pub fn new(office: OfficeLocation) -> Self {
        Self { office: Ok(office) }
    }

    /// A fence whose configuration could not be loaded; checks fall back to permissive.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            office: Err(reason.into()),
        }
    }

    pub fn office(&self) -> Option<&OfficeLocation> {
        self.office.as_ref().ok()
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        match &self.office {
            Ok(office) => is_within_radius(point, office.center, office.radius_meters),
            Err(reason) => {
                warn!(
                    latitude = point.latitude,
                    longitude = point.longitude,
                    "Geofence unavailable ({}), treating location as inside the office",
                    reason
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert_eq!(distance(35.6812, 139.7671, 35.6812, 139.7671), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        // pi * R / 180
        let expected = std::f64::consts::PI * EARTH_RADIUS_METERS / 180.0;
        let d = distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - expected).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn tokyo_to_osaka() {
        // Tokyo Station -> Osaka Station, roughly 403 km
        let d = distance(35.6812, 139.7671, 34.7025, 135.4959);
        assert!((d - 403_000.0).abs() < 3_000.0, "got {d}");
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let center = Coordinates::new(35.0, 139.0).unwrap();
        let point = Coordinates::new(35.001, 139.0).unwrap();
        let d = distance(35.001, 139.0, 35.0, 139.0);
        assert!(is_within_radius(point, center, d));
        assert!(!is_within_radius(point, center, d - 0.5));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(Coordinates::new(91.0, 0.0), Err(GeoError::InvalidLatitude(91.0)));
        assert_eq!(Coordinates::new(0.0, -181.0), Err(GeoError::InvalidLongitude(-181.0)));
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert_eq!(OfficeLocation::new(0.0, 0.0, 0.0), Err(GeoError::InvalidRadius(0.0)));
    }

    #[test]
    fn unavailable_fence_is_permissive() {
        let fence = GeoFence::unavailable("OFFICE_LATITUDE missing");
        let far_away = Coordinates::new(-33.8688, 151.2093).unwrap();
        assert!(fence.contains(far_away));

        let office = OfficeLocation::new(35.6812, 139.7671, 200.0).unwrap();
        assert!(!GeoFence::new(office).contains(far_away));
    }
}
