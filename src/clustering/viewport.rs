//! Map viewport geometry

use serde::{Deserialize, Serialize};

/// Geographic rectangle, west/south/east/north in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.west && longitude <= self.east && latitude >= self.south && latitude <= self.north
    }

    /// Visible region covering exactly this box
    #[must_use]
    pub fn region(&self) -> Region {
        Region {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
            latitude_delta: self.north - self.south,
            longitude_delta: self.east - self.west,
        }
    }
}

/// Mainland Denmark and the main islands
pub const DENMARK_BOUNDS: BoundingBox =
    BoundingBox::new(8.089_976_840_86, 54.800_014_553_4, 12.690_006_137_8, 57.730_016_588);

/// Visible map region as reported by the map view: centre plus span
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Region {
    /// Exactly the visible bounds, without padding
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox {
            west: self.longitude - self.longitude_delta * 0.5,
            south: self.latitude - self.latitude_delta * 0.5,
            east: self.longitude + self.longitude_delta * 0.5,
            north: self.latitude + self.latitude_delta * 0.5,
        }
    }

    #[must_use]
    pub fn zoom(&self) -> i32 {
        zoom_level(self.longitude_delta)
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Discrete zoom for a viewport `longitude_delta` degrees wide:
/// `round(log2(360 / delta))`, halves rounding up
///
/// Degenerate widths saturate: zero gives `i32::MAX`, NaN gives 0.
#[must_use]
pub fn zoom_level(longitude_delta: f64) -> i32 {
    ((360.0 / longitude_delta).log2() + 0.5).floor() as i32
}

/// Movement kinds that trigger a refresh once exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKind {
    /// Re-centre the camera on the user
    Zoom,
    /// Recompute the route to the selected beach
    Route,
}

impl ThresholdKind {
    /// Threshold in planar degrees
    #[must_use]
    pub fn distance(self) -> f64 {
        match self {
            ThresholdKind::Zoom => 0.1,
            ThresholdKind::Route => 0.2,
        }
    }
}

/// Whether two `(longitude, latitude)` positions are further apart than the
/// threshold of `kind`, measured as planar distance in degrees
///
/// A missing position never passes.
#[must_use]
pub fn passed_distance_threshold(
    kind: ThresholdKind,
    origin: Option<(f64, f64)>,
    destination: Option<(f64, f64)>,
) -> bool {
    let (Some((origin_lon, origin_lat)), Some((dest_lon, dest_lat))) = (origin, destination) else {
        return false;
    };
    let distance = (dest_lat - origin_lat).hypot(dest_lon - origin_lon);
    distance > kind.distance()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(360.0, 0)]
    #[case(180.0, 1)]
    #[case(90.0, 2)]
    #[case(1.40625, 8)]
    #[case(0.02197265625, 14)]
    #[case(720.0, -1)]
    fn test_zoom_level(#[case] delta: f64, #[case] expected: i32) {
        assert_eq!(zoom_level(delta), expected);
    }

    #[test]
    fn test_zoom_level_rounds_to_nearest() {
        assert_eq!(zoom_level(360.0 / 2f64.powf(2.4)), 2);
        assert_eq!(zoom_level(360.0 / 2f64.powf(2.6)), 3);
        assert_eq!(zoom_level(0.0), i32::MAX);
    }

    #[test]
    fn test_region_bounds_have_no_padding() {
        let region = Region {
            latitude: 56.0,
            longitude: 10.0,
            latitude_delta: 2.0,
            longitude_delta: 4.0,
        };
        assert_eq!(region.bounds(), BoundingBox::new(8.0, 55.0, 12.0, 57.0));
        assert_eq!(region.bounds().region(), region);
        assert_eq!(region.zoom(), 6);
    }

    #[test]
    fn test_denmark_bounds() {
        assert!(DENMARK_BOUNDS.west < DENMARK_BOUNDS.east);
        assert!(DENMARK_BOUNDS.contains(12.568, 55.676));
        assert!(!DENMARK_BOUNDS.contains(13.0, 55.6));
    }

    #[rstest]
    #[case(ThresholdKind::Zoom, (12.0, 55.0), (12.05, 55.05), false)]
    #[case(ThresholdKind::Zoom, (12.0, 55.0), (12.1, 55.1), true)]
    #[case(ThresholdKind::Route, (12.0, 55.0), (12.1, 55.1), false)]
    #[case(ThresholdKind::Route, (12.0, 55.0), (12.3, 55.0), true)]
    fn test_distance_threshold(
        #[case] kind: ThresholdKind,
        #[case] origin: (f64, f64),
        #[case] destination: (f64, f64),
        #[case] expected: bool,
    ) {
        assert_eq!(passed_distance_threshold(kind, Some(origin), Some(destination)), expected);
    }

    #[test]
    fn test_missing_position_never_passes() {
        assert!(!passed_distance_threshold(ThresholdKind::Zoom, None, Some((12.0, 55.0))));
        assert!(!passed_distance_threshold(ThresholdKind::Route, Some((12.0, 55.0)), None));
    }
}
