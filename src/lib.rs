//! `badevand` - Danish beach water-quality data for map applications
//!
//! This library acquires the beach dataset from badevand.dk (direct fetch,
//! falling back to an embedded browser that passes the site's bot checks),
//! keeps it in a persistent cache, and clusters beaches into map markers.

pub mod cache;
pub mod clustering;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod scrape;
pub mod telemetry;
pub mod transform;
pub mod validate;

// Re-export core types for public API
pub use cache::{CachedDataset, DataCache, FjallStore, KeyValueStore, MemoryStore};
pub use clustering::{
    BoundingBox, ClusterError, ClusterNode, ClusterOptions, GeoIndex, GeoPoint, Marker, MarkerLayer, Region,
};
pub use config::BadevandConfig;
pub use error::BadevandError;
pub use fetch::{BeachSource, DirectFetcher, FetchError};
pub use models::{BeachRecord, DailyObservation, WaterQuality, WaterQualityCounts};
pub use orchestrator::{AcquisitionOrchestrator, BackoffPolicy, LoaderStatus, OrchestratorEvent, RefreshMode};
pub use scrape::{BrowserHost, HostError, HostEvent, LoadRequest, ScrapeSession, SessionEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, BadevandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
