//! Supported spatial reference systems.
//!
//! Raw element coordinates are WGS84 degrees. Geometries are stored in one
//! configured reference system, identified by SRID.

use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;

use geo::Coord;
use thiserror::Error;

use crate::entity::is_wgs84;

/// Semi-major axis of the spherical Web Mercator projection, in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the Web Mercator square, in metres.
pub const WEB_MERCATOR_HALF_EXTENT: f64 = PI * EARTH_RADIUS;

/// Latitude bound of the Web Mercator square, in degrees.
pub const WEB_MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Errors raised when resolving or applying a spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ProjectionError {
    /// The SRID is not one of the supported systems.
    #[error("unsupported SRID {srid}; expected 3857 or 4326")]
    UnsupportedSrid {
        /// Rejected SRID.
        srid: i32,
    },
    /// The coordinate was not a finite WGS84 position.
    #[error("coordinate ({lon}, {lat}) is not a valid WGS84 position")]
    InvalidCoordinate {
        /// Offending longitude.
        lon: f64,
        /// Offending latitude.
        lat: f64,
    },
}

/// Reference system used for stored geometries and cached coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpatialReference {
    /// EPSG:3857, spherical Web Mercator metres.
    #[default]
    WebMercator,
    /// EPSG:4326, longitude/latitude degrees.
    Wgs84,
}

impl SpatialReference {
    /// Numeric SRID of this reference system.
    #[must_use]
    pub const fn srid(self) -> i32 {
        match self {
            Self::WebMercator => 3857,
            Self::Wgs84 => 4326,
        }
    }

    /// Resolve a reference system from its SRID.
    ///
    /// # Examples
    /// ```
    /// use osmsync_core::{ProjectionError, SpatialReference};
    ///
    /// assert_eq!(SpatialReference::from_srid(4326), Ok(SpatialReference::Wgs84));
    /// assert_eq!(
    ///     SpatialReference::from_srid(2056),
    ///     Err(ProjectionError::UnsupportedSrid { srid: 2056 })
    /// );
    /// ```
    pub const fn from_srid(srid: i32) -> Result<Self, ProjectionError> {
        match srid {
            3857 => Ok(Self::WebMercator),
            4326 => Ok(Self::Wgs84),
            _ => Err(ProjectionError::UnsupportedSrid { srid }),
        }
    }

    /// Project a WGS84 position into this reference system.
    pub fn project(self, lon: f64, lat: f64) -> Result<Coord<f64>, ProjectionError> {
        if !is_wgs84(lon, lat) {
            return Err(ProjectionError::InvalidCoordinate { lon, lat });
        }
        Ok(match self {
            Self::Wgs84 => Coord { x: lon, y: lat },
            Self::WebMercator => wgs84_to_web_mercator(Coord { x: lon, y: lat }),
        })
    }

    /// Convert a coordinate in this reference system to Web Mercator.
    #[must_use]
    pub fn to_web_mercator(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Self::WebMercator => coord,
            Self::Wgs84 => wgs84_to_web_mercator(coord),
        }
    }
}

impl TryFrom<i32> for SpatialReference {
    type Error = ProjectionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_srid(value)
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.srid())
    }
}

fn wgs84_to_web_mercator(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord
        .y
        .clamp(-WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_MAX_LATITUDE);
    let x = EARTH_RADIUS * coord.x.to_radians();
    let y = EARTH_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Coord { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TOLERANCE: f64 = 1e-6;

    #[rstest]
    #[case(SpatialReference::WebMercator)]
    #[case(SpatialReference::Wgs84)]
    fn srid_round_trips(#[case] reference: SpatialReference) {
        assert_eq!(SpatialReference::from_srid(reference.srid()), Ok(reference));
    }

    #[rstest]
    fn web_mercator_origin_maps_to_zero() {
        let coord = SpatialReference::WebMercator
            .project(0.0, 0.0)
            .expect("origin projects");
        assert!(coord.x.abs() < TOLERANCE);
        assert!(coord.y.abs() < TOLERANCE);
    }

    #[rstest]
    fn web_mercator_edge_matches_half_extent() {
        let coord = SpatialReference::WebMercator
            .project(180.0, WEB_MERCATOR_MAX_LATITUDE)
            .expect("edge projects");
        assert!((coord.x - WEB_MERCATOR_HALF_EXTENT).abs() < 1e-3);
        assert!((coord.y - WEB_MERCATOR_HALF_EXTENT).abs() < 1e-3);
    }

    #[rstest]
    fn poles_are_clamped_to_the_mercator_square() {
        let coord = SpatialReference::WebMercator
            .project(0.0, 90.0)
            .expect("pole projects");
        assert!(coord.y.is_finite());
        assert!(coord.y <= WEB_MERCATOR_HALF_EXTENT + 1e-3);
    }

    #[rstest]
    #[case(181.0, 0.0)]
    #[case(0.0, -91.0)]
    #[case(f64::INFINITY, 0.0)]
    fn invalid_positions_are_rejected(#[case] lon: f64, #[case] lat: f64) {
        let outcome = SpatialReference::Wgs84.project(lon, lat);
        assert!(matches!(outcome, Err(ProjectionError::InvalidCoordinate { .. })));
    }

    #[rstest]
    fn wgs84_keeps_degrees() {
        let coord = SpatialReference::Wgs84.project(9.5, 47.1).expect("valid");
        assert_eq!(coord, Coord { x: 9.5, y: 47.1 });
    }
}
