//! Hierarchical greedy point clustering
//!
//! Points are projected to unit Web Mercator space and merged bottom-up, one
//! kd-tree per zoom level from `max_zoom + 1` (raw points) down to
//! `min_zoom`. A cluster id encodes the position of its origin node and the
//! zoom level it was formed at, so ids are stable for a given input set.

use std::cmp::Ordering;
use std::f64::consts::PI;

use thiserror::Error;

use super::kdtree::KdTree;
use super::viewport::BoundingBox;
use crate::config::ClusteringConfig;

const UNVISITED: u8 = u8::MAX;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("point {id} has invalid coordinates ({longitude}, {latitude})")]
    InvalidCoordinate {
        id: i64,
        longitude: f64,
        latitude: f64,
    },

    #[error("no cluster with id {0}")]
    UnknownCluster(usize),
}

/// Clustering input: a position plus whatever the caller wants back
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint<T> {
    pub id: i64,
    pub longitude: f64,
    pub latitude: f64,
    pub payload: T,
}

impl<T> GeoPoint<T> {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.longitude.total_cmp(&other.longitude))
            .then_with(|| self.latitude.total_cmp(&other.latitude))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Merge radius in pixels at tile `extent`; 0 disables merging
    pub radius: f64,
    pub extent: f64,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Minimum number of points to form a cluster
    pub min_points: usize,
    pub node_size: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self::from(&ClusteringConfig::default())
    }
}

impl From<&ClusteringConfig> for ClusterOptions {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            radius: f64::from(config.radius_pixels),
            extent: f64::from(config.extent),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            min_points: config.min_points as usize,
            node_size: config.node_size,
        }
    }
}

impl ClusterOptions {
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }
}

/// A synthetic node standing for several points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub id: usize,
    pub longitude: f64,
    pub latitude: f64,
    pub point_count: usize,
}

/// One entry of a query result
#[derive(Debug, PartialEq)]
pub enum ClusterNode<'a, T> {
    Leaf(&'a GeoPoint<T>),
    Aggregate(Aggregate),
}

impl<T> Clone for ClusterNode<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ClusterNode<'_, T> {}

impl<T> ClusterNode<'_, T> {
    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            ClusterNode::Leaf(_) => 1,
            ClusterNode::Aggregate(aggregate) => aggregate.point_count,
        }
    }

    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        match self {
            ClusterNode::Leaf(point) => (point.longitude, point.latitude),
            ClusterNode::Aggregate(aggregate) => (aggregate.longitude, aggregate.latitude),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    x: f64,
    y: f64,
    /// Zoom at which this node was last visited
    zoom: u8,
    /// Point index for leaves, cluster id for clusters
    source: usize,
    parent: Option<usize>,
    num_points: usize,
}

impl Node {
    fn is_cluster(&self) -> bool {
        self.num_points > 1
    }
}

#[derive(Debug)]
struct Level {
    nodes: Vec<Node>,
    tree: KdTree,
}

impl Level {
    fn new(nodes: Vec<Node>, node_size: usize) -> Self {
        let tree = KdTree::new(nodes.iter().map(|node| (node.x, node.y)), node_size);
        Self { nodes, tree }
    }
}

/// Immutable cluster hierarchy over a point set
#[derive(Debug)]
pub struct GeoIndex<T> {
    options: ClusterOptions,
    points: Vec<GeoPoint<T>>,
    /// `levels[i]` holds zoom `min_zoom + i`, up to `max_zoom + 1`
    levels: Vec<Level>,
}

impl<T> GeoIndex<T> {
    /// Build the hierarchy. Input order does not matter.
    pub fn build(mut points: Vec<GeoPoint<T>>, options: ClusterOptions) -> Result<Self, ClusterError> {
        if let Some(bad) = points
            .iter()
            .find(|p| !p.longitude.is_finite() || !p.latitude.is_finite())
        {
            return Err(ClusterError::InvalidCoordinate {
                id: bad.id,
                longitude: bad.longitude,
                latitude: bad.latitude,
            });
        }
        points.sort_by(GeoPoint::canonical_cmp);

        let leaves: Vec<Node> = points
            .iter()
            .enumerate()
            .map(|(i, point)| Node {
                x: lng_x(point.longitude),
                y: lat_y(point.latitude),
                zoom: UNVISITED,
                source: i,
                parent: None,
                num_points: 1,
            })
            .collect();

        let min_zoom = options.min_zoom.min(options.max_zoom);
        let mut stack = vec![Level::new(leaves, options.node_size)];
        for zoom in (min_zoom..=options.max_zoom).rev() {
            let below = stack.last_mut().map(|level| cluster_level(level, zoom, &options, points.len()));
            stack.push(Level::new(below.unwrap_or_default(), options.node_size));
        }
        stack.reverse();

        Ok(Self {
            options: ClusterOptions { min_zoom, ..options },
            points,
            levels: stack,
        })
    }

    #[must_use]
    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Input points in canonical order
    #[must_use]
    pub fn points(&self) -> &[GeoPoint<T>] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn level(&self, zoom: usize) -> Option<&Level> {
        zoom.checked_sub(usize::from(self.options.min_zoom))
            .and_then(|i| self.levels.get(i))
    }

    fn limit_zoom(&self, zoom: f64) -> usize {
        let min = f64::from(self.options.min_zoom);
        let max = f64::from(self.options.max_zoom) + 1.0;
        zoom.floor().min(max).max(min) as usize
    }

    fn node_view(&self, node: &Node) -> ClusterNode<'_, T> {
        if node.is_cluster() {
            ClusterNode::Aggregate(Aggregate {
                id: node.source,
                longitude: x_lng(node.x),
                latitude: y_lat(node.y),
                point_count: node.num_points,
            })
        } else {
            ClusterNode::Leaf(&self.points[node.source])
        }
    }

    /// Nodes visible inside `bounds` at `zoom`
    ///
    /// Longitudes wrap; a box crossing the antimeridian returns the eastern
    /// half followed by the western half.
    #[must_use]
    pub fn query(&self, bounds: &BoundingBox, zoom: f64) -> Vec<ClusterNode<'_, T>> {
        let mut min_lng = wrap_longitude(bounds.west);
        let mut max_lng = if bounds.east == 180.0 {
            180.0
        } else {
            wrap_longitude(bounds.east)
        };
        let min_lat = bounds.south.clamp(-90.0, 90.0);
        let max_lat = bounds.north.clamp(-90.0, 90.0);

        if bounds.east - bounds.west >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut nodes =
                self.query(&BoundingBox::new(min_lng, min_lat, 180.0, max_lat), zoom);
            nodes.extend(self.query(&BoundingBox::new(-180.0, min_lat, max_lng, max_lat), zoom));
            return nodes;
        }

        let Some(level) = self.level(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        level
            .tree
            .range(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat))
            .into_iter()
            .map(|i| self.node_view(&level.nodes[i]))
            .collect()
    }

    fn origin(&self, cluster_id: usize) -> Result<(usize, usize), ClusterError> {
        let offset = cluster_id
            .checked_sub(self.points.len())
            .ok_or(ClusterError::UnknownCluster(cluster_id))?;
        Ok((offset >> 5, offset % 32))
    }

    /// Immediate children of a cluster, one zoom level further in
    pub fn children(&self, cluster_id: usize) -> Result<Vec<ClusterNode<'_, T>>, ClusterError> {
        let unknown = ClusterError::UnknownCluster(cluster_id);
        let (origin_id, origin_zoom) = self.origin(cluster_id)?;
        if origin_zoom == 0 {
            return Err(unknown);
        }
        let level = self.level(origin_zoom).ok_or_else(|| unknown.clone())?;
        let origin = level.nodes.get(origin_id).ok_or_else(|| unknown.clone())?;

        let radius = self.options.radius / (self.options.extent * 2f64.powi(origin_zoom as i32 - 1));
        let children: Vec<_> = level
            .tree
            .within(origin.x, origin.y, radius)
            .into_iter()
            .map(|i| &level.nodes[i])
            .filter(|node| node.parent == Some(cluster_id))
            .map(|node| self.node_view(node))
            .collect();

        if children.is_empty() {
            return Err(unknown);
        }
        Ok(children)
    }

    /// Up to `limit` points beneath a cluster, skipping the first `offset`
    pub fn leaves(
        &self,
        cluster_id: usize,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<&GeoPoint<T>>, ClusterError> {
        let mut leaves = Vec::new();
        self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;
        Ok(leaves)
    }

    /// Up to `limit` points beneath a cluster, in a stable order
    pub fn expand(&self, cluster_id: usize, limit: usize) -> Result<Vec<&GeoPoint<T>>, ClusterError> {
        self.leaves(cluster_id, limit, 0)
    }

    fn append_leaves<'a>(
        &'a self,
        result: &mut Vec<&'a GeoPoint<T>>,
        cluster_id: usize,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize, ClusterError> {
        for child in self.children(cluster_id)? {
            match child {
                ClusterNode::Aggregate(aggregate) => {
                    if skipped + aggregate.point_count <= offset {
                        skipped += aggregate.point_count;
                    } else {
                        skipped = self.append_leaves(result, aggregate.id, limit, offset, skipped)?;
                    }
                }
                ClusterNode::Leaf(_) if skipped < offset => skipped += 1,
                ClusterNode::Leaf(point) => result.push(point),
            }
            if result.len() >= limit {
                break;
            }
        }
        Ok(skipped)
    }

    /// Lowest zoom at which the cluster splits into more than one node
    pub fn expansion_zoom(&self, cluster_id: usize) -> Result<u8, ClusterError> {
        let (_, origin_zoom) = self.origin(cluster_id)?;
        let mut zoom = origin_zoom.saturating_sub(1);
        let mut current = cluster_id;
        while zoom <= usize::from(self.options.max_zoom) {
            let children = self.children(current)?;
            zoom += 1;
            match children.as_slice() {
                [ClusterNode::Aggregate(only)] => current = only.id,
                _ => break,
            }
        }
        Ok(u8::try_from(zoom).unwrap_or(u8::MAX))
    }
}

/// Merge the nodes of `level` (one zoom above) into the nodes of `zoom`
fn cluster_level(level: &mut Level, zoom: u8, options: &ClusterOptions, point_count: usize) -> Vec<Node> {
    let radius = options.radius / (options.extent * 2f64.powi(i32::from(zoom)));
    let mut next = Vec::with_capacity(level.nodes.len());

    for i in 0..level.nodes.len() {
        if level.nodes[i].zoom <= zoom {
            continue;
        }
        level.nodes[i].zoom = zoom;
        let origin = level.nodes[i];

        let neighbors = if options.radius > 0.0 {
            level.tree.within(origin.x, origin.y, radius)
        } else {
            Vec::new()
        };

        let num_points = origin.num_points
            + neighbors
                .iter()
                .map(|&k| &level.nodes[k])
                .filter(|node| node.zoom > zoom)
                .map(|node| node.num_points)
                .sum::<usize>();

        if num_points > origin.num_points && num_points >= options.min_points {
            let id = (i << 5) + usize::from(zoom) + 1 + point_count;
            let mut wx = origin.x * origin.num_points as f64;
            let mut wy = origin.y * origin.num_points as f64;

            for &k in &neighbors {
                let neighbor = &mut level.nodes[k];
                if neighbor.zoom <= zoom {
                    continue;
                }
                neighbor.zoom = zoom;
                neighbor.parent = Some(id);
                wx += neighbor.x * neighbor.num_points as f64;
                wy += neighbor.y * neighbor.num_points as f64;
            }

            level.nodes[i].parent = Some(id);
            next.push(Node {
                x: wx / num_points as f64,
                y: wy / num_points as f64,
                zoom: UNVISITED,
                source: id,
                parent: None,
                num_points,
            });
        } else {
            next.push(origin);
            if num_points > 1 {
                for &k in &neighbors {
                    let neighbor = &mut level.nodes[k];
                    if neighbor.zoom <= zoom {
                        continue;
                    }
                    neighbor.zoom = zoom;
                    next.push(*neighbor);
                }
            }
        }
    }
    next
}

fn wrap_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

fn lng_x(longitude: f64) -> f64 {
    longitude / 360.0 + 0.5
}

fn lat_y(latitude: f64) -> f64 {
    let sin = (latitude * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}
