//! Render-ready markers for the visible part of the map

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use tracing::{debug, warn};

use super::index::{ClusterNode, ClusterOptions, GeoIndex, GeoPoint};
use super::viewport::Region;
use crate::config::ClusteringConfig;
use crate::models::{BeachRecord, WaterQuality, WaterQualityCounts};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Marker {
    Beach {
        beach_id: i64,
        longitude: f64,
        latitude: f64,
        today_quality: WaterQuality,
        water_temperature: Option<String>,
    },
    Cluster {
        cluster_id: usize,
        longitude: f64,
        latitude: f64,
        point_count: usize,
        beach_ids: Vec<i64>,
        counts: WaterQualityCounts,
    },
}

struct Built {
    key: u64,
    /// `None` when the build failed; the failure is memoized too
    index: Option<GeoIndex<usize>>,
}

/// Memoized clustering of the beach list
///
/// The index is rebuilt only when the sequence of beach positions or the
/// effective radius changes. Viewport changes reuse it.
pub struct MarkerLayer {
    options: ClusterOptions,
    performance_mode: bool,
    built: Option<Built>,
    builds: usize,
}

impl MarkerLayer {
    #[must_use]
    pub fn new(config: &ClusteringConfig) -> Self {
        Self {
            options: ClusterOptions::from(config),
            performance_mode: false,
            built: None,
            builds: 0,
        }
    }

    /// Performance mode shows every beach individually
    pub fn set_performance_mode(&mut self, enabled: bool) {
        self.performance_mode = enabled;
    }

    #[must_use]
    pub fn performance_mode(&self) -> bool {
        self.performance_mode
    }

    /// How many times the index has been built
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds
    }

    fn effective_options(&self) -> ClusterOptions {
        if self.performance_mode {
            self.options.clone().with_radius(0.0)
        } else {
            self.options.clone()
        }
    }

    /// Markers for `records` inside `region`; empty when clustering fails
    pub fn markers(&mut self, records: &[BeachRecord], region: &Region) -> Vec<Marker> {
        if records.is_empty() {
            return Vec::new();
        }

        let options = self.effective_options();
        let key = fingerprint(records, &options);
        if self.built.as_ref().is_none_or(|built| built.key != key) {
            self.builds += 1;
            let points = records
                .iter()
                .enumerate()
                .map(|(i, record)| GeoPoint {
                    id: record.id,
                    longitude: record.longitude,
                    latitude: record.latitude,
                    payload: i,
                })
                .collect();
            let index = match GeoIndex::build(points, options) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Failed to build marker clusters: {}", e);
                    None
                }
            };
            self.built = Some(Built { key, index });
        }

        let Some(index) = self.built.as_ref().and_then(|built| built.index.as_ref()) else {
            return Vec::new();
        };

        let zoom = region.zoom();
        let nodes = index.query(&region.bounds(), f64::from(zoom));
        debug!(zoom, nodes = nodes.len(), "Computed visible clusters");
        nodes
            .into_iter()
            .filter_map(|node| to_marker(index, records, node))
            .collect()
    }
}

fn to_marker(index: &GeoIndex<usize>, records: &[BeachRecord], node: ClusterNode<'_, usize>) -> Option<Marker> {
    match node {
        ClusterNode::Leaf(point) => {
            let beach = records.get(point.payload)?;
            Some(Marker::Beach {
                beach_id: beach.id,
                longitude: beach.longitude,
                latitude: beach.latitude,
                today_quality: beach.today_quality(),
                water_temperature: beach.today().map(|today| today.water_temperature.clone()),
            })
        }
        ClusterNode::Aggregate(aggregate) => {
            let members: Vec<&BeachRecord> = match index.expand(aggregate.id, usize::MAX) {
                Ok(leaves) => leaves.iter().filter_map(|leaf| records.get(leaf.payload)).collect(),
                Err(e) => {
                    debug!("Could not expand cluster {}: {}", aggregate.id, e);
                    Vec::new()
                }
            };
            Some(Marker::Cluster {
                cluster_id: aggregate.id,
                longitude: aggregate.longitude,
                latitude: aggregate.latitude,
                point_count: aggregate.point_count,
                beach_ids: members.iter().map(|beach| beach.id).collect(),
                counts: WaterQualityCounts::tally(members),
            })
        }
    }
}

fn fingerprint(records: &[BeachRecord], options: &ClusterOptions) -> u64 {
    let mut hasher = DefaultHasher::new();
    records.len().hash(&mut hasher);
    for record in records {
        record.id.hash(&mut hasher);
        record.longitude.to_bits().hash(&mut hasher);
        record.latitude.to_bits().hash(&mut hasher);
    }
    options.radius.to_bits().hash(&mut hasher);
    options.extent.to_bits().hash(&mut hasher);
    (options.min_zoom, options.max_zoom, options.min_points, options.node_size).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::DENMARK_BOUNDS;
    use crate::models::{DailyObservation, Municipality, WeatherType};

    fn observation(quality: WaterQuality) -> DailyObservation {
        DailyObservation {
            date: "2024-07-01".to_string(),
            water_quality: quality,
            water_temperature: "19".to_string(),
            current_speed: "0,3".to_string(),
            current_direction: "90".to_string(),
            air_temperature: "22".to_string(),
            wind_speed: "4".to_string(),
            wind_direction: "270".to_string(),
            wind_direction_display: "W".to_string(),
            weather_type: WeatherType::Sun,
            precipitation: String::new(),
        }
    }

    fn beach(id: i64, longitude: f64, latitude: f64, quality: Option<WaterQuality>) -> BeachRecord {
        BeachRecord {
            id,
            name: format!("Beach {id}"),
            municipality: Municipality {
                name: "København".to_string(),
                website: None,
            },
            description: String::new(),
            comments: String::new(),
            facilities: None,
            links: vec![],
            latitude,
            longitude,
            data: quality.map(observation).into_iter().collect(),
        }
    }

    fn copenhagen() -> Vec<BeachRecord> {
        vec![
            beach(1, 12.6480, 55.6560, Some(WaterQuality::Good)),
            beach(2, 12.6490, 55.6570, Some(WaterQuality::Bad)),
            beach(3, 12.6500, 55.6580, None),
            beach(4, 10.2000, 56.1500, Some(WaterQuality::Closed)),
        ]
    }

    fn country() -> Region {
        DENMARK_BOUNDS.region()
    }

    #[test]
    fn test_cluster_marker_counts_members() {
        let mut layer = MarkerLayer::new(&ClusteringConfig::default());
        let markers = layer.markers(&copenhagen(), &country());
        assert_eq!(markers.len(), 2);

        let cluster = markers
            .iter()
            .find_map(|marker| match marker {
                Marker::Cluster {
                    point_count,
                    beach_ids,
                    counts,
                    ..
                } => Some((*point_count, beach_ids.clone(), *counts)),
                Marker::Beach { .. } => None,
            })
            .unwrap();

        let (point_count, mut beach_ids, counts) = cluster;
        beach_ids.sort_unstable();
        assert_eq!(point_count, 3);
        assert_eq!(beach_ids, vec![1, 2, 3]);
        assert_eq!(
            counts,
            WaterQualityCounts {
                good: 1,
                bad: 1,
                unknown: 1,
                closed: 0
            }
        );

        assert!(markers.iter().any(|marker| matches!(
            marker,
            Marker::Beach {
                beach_id: 4,
                today_quality: WaterQuality::Closed,
                ..
            }
        )));
    }

    #[test]
    fn test_performance_mode_shows_every_beach() {
        let mut layer = MarkerLayer::new(&ClusteringConfig::default());
        layer.set_performance_mode(true);
        let markers = layer.markers(&copenhagen(), &country());
        assert_eq!(markers.len(), 4);
        assert!(markers.iter().all(|marker| matches!(marker, Marker::Beach { .. })));

        let no_reading = markers
            .iter()
            .find(|marker| matches!(marker, Marker::Beach { beach_id: 3, .. }))
            .unwrap();
        assert!(matches!(
            no_reading,
            Marker::Beach {
                today_quality: WaterQuality::Unknown,
                water_temperature: None,
                ..
            }
        ));
    }

    #[test]
    fn test_index_is_memoized_across_viewports() {
        let mut layer = MarkerLayer::new(&ClusteringConfig::default());
        let records = copenhagen();

        layer.markers(&records, &country());
        let zoomed_in = Region {
            latitude: 55.657,
            longitude: 12.649,
            latitude_delta: 0.01,
            longitude_delta: 0.01,
        };
        layer.markers(&records, &zoomed_in);
        assert_eq!(layer.builds(), 1);

        layer.set_performance_mode(true);
        layer.markers(&records, &country());
        assert_eq!(layer.builds(), 2);

        let mut moved = records.clone();
        moved[0].latitude += 0.5;
        layer.markers(&moved, &country());
        assert_eq!(layer.builds(), 3);
    }

    #[test]
    fn test_bad_coordinate_degrades_to_empty() {
        let mut layer = MarkerLayer::new(&ClusteringConfig::default());
        let mut records = copenhagen();
        records.push(beach(5, f64::NAN, f64::NAN, None));

        assert!(layer.markers(&records, &country()).is_empty());
        assert!(layer.markers(&[], &country()).is_empty());
    }

    #[test]
    fn test_viewport_limits_markers() {
        let mut layer = MarkerLayer::new(&ClusteringConfig::default());
        let aarhus = Region {
            latitude: 56.15,
            longitude: 10.2,
            latitude_delta: 0.2,
            longitude_delta: 0.2,
        };
        let markers = layer.markers(&copenhagen(), &aarhus);
        assert_eq!(markers.len(), 1);
        assert!(matches!(markers[0], Marker::Beach { beach_id: 4, .. }));
    }
}
