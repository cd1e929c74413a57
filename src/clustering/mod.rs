//! Spatial clustering of beach markers

pub mod index;
pub mod kdtree;
pub mod markers;
pub mod viewport;

pub use index::{Aggregate, ClusterError, ClusterNode, ClusterOptions, GeoIndex, GeoPoint};
pub use markers::{Marker, MarkerLayer};
pub use viewport::{
    BoundingBox, DENMARK_BOUNDS, Region, ThresholdKind, passed_distance_threshold, zoom_level,
};
