use std::sync::Arc;
use std::time::Instant;

use geojson::feature::Id;
use geojson::{Feature, Geometry, JsonObject};
use serde_json::{Number, Value};
use tracing::debug;

use crate::cluster::kdbush::KdBush;
use crate::error::{Result, TilerError};
use crate::expression::ClusterProperties;
use crate::options::ClusterOptions;
use crate::tiler::convert::{lat_y, lng_x, x_lng, y_lat};
use crate::tiler::tile::{TileFeature, TileGeomType, TileGeometry, round_half_up};

/// Page size of [`Supercluster::get_leaves`] when none is given.
pub const DEFAULT_LEAVES_LIMIT: usize = 10;

#[derive(Debug, Clone)]
struct ClusterPoint {
    x: f64,
    y: f64,
    /// Zoom the point was last visited at; `None` until then.
    zoom: Option<u8>,
    /// Input index for leaves, cluster id for clusters.
    id: u64,
    parent: Option<u64>,
    num_points: u64,
    /// Index into the aggregated cluster properties.
    props: Option<usize>,
}

impl ClusterPoint {
    fn visited(&self, zoom: u8) -> bool {
        self.zoom.is_some_and(|visited| visited <= zoom)
    }

    fn is_cluster(&self) -> bool {
        self.num_points > 1
    }
}

#[derive(Debug)]
struct ClusterTree {
    index: KdBush,
    points: Vec<ClusterPoint>,
}

impl ClusterTree {
    fn new(points: Vec<ClusterPoint>, node_size: usize) -> Self {
        let index = KdBush::new(&points, |p| fround(p.x), |p| fround(p.y), node_size);
        Self { index, points }
    }
}

fn fround(value: f64) -> f64 {
    value as f32 as f64
}

/// Hierarchical greedy clustering of point features, one KD-tree per zoom.
#[derive(Debug)]
pub struct Supercluster {
    options: ClusterOptions,
    aggregates: Option<ClusterProperties>,
    points: Vec<Feature>,
    trees: Vec<Option<ClusterTree>>,
    cluster_props: Vec<JsonObject>,
}

impl Supercluster {
    /// Builds the cluster hierarchy over the point features of `points`.
    /// Features without a point geometry are not indexed.
    pub fn load(
        points: Vec<Feature>,
        options: ClusterOptions,
        aggregates: Option<ClusterProperties>,
    ) -> Result<Self> {
        options.validate()?;
        let aggregates = aggregates.filter(|aggregates| !aggregates.is_empty());

        let started = Instant::now();
        let mut leaves = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            let Some((lng, lat)) = point_coordinates(point) else {
                continue;
            };
            leaves.push(ClusterPoint {
                x: fround(lng_x(lng)),
                y: fround(lat_y(lat)),
                zoom: None,
                id: index as u64,
                parent: None,
                num_points: 1,
                props: None,
            });
        }
        debug!(
            points = leaves.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prepared points"
        );

        let max_zoom = options.max_zoom as usize;
        let mut index = Self {
            options,
            aggregates,
            points,
            trees: (0..=max_zoom + 1).map(|_| None).collect(),
            cluster_props: Vec::new(),
        };

        let node_size = index.options.node_size;
        index.trees[max_zoom + 1] = Some(ClusterTree::new(leaves, node_size));
        for z in (index.options.min_zoom..=index.options.max_zoom).rev() {
            let started = Instant::now();
            let next = index.cluster(z);
            debug!(
                zoom = z,
                clusters = next.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "clustered zoom"
            );
            index.trees[z as usize] = Some(ClusterTree::new(next, node_size));
        }
        Ok(index)
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Number of input features, indexed or not.
    pub fn input_len(&self) -> usize {
        self.points.len()
    }

    /// Clusters the tree of zoom `z + 1` into the point set of zoom `z`.
    fn cluster(&mut self, zoom: u8) -> Vec<ClusterPoint> {
        let radius = self.options.radius / (self.options.extent * 2f64.powi(zoom as i32));
        let min_points = self.options.min_points as u64;
        let input_len = self.points.len() as u64;
        let Some(tree) = self.trees[zoom as usize + 1].as_mut() else {
            return Vec::new();
        };

        let mut next = Vec::new();
        for i in 0..tree.points.len() {
            if tree.points[i].visited(zoom) {
                continue;
            }
            tree.points[i].zoom = Some(zoom);

            let (x, y) = (tree.points[i].x, tree.points[i].y);
            let neighbors = tree.index.within(x, y, radius);
            let origin_points = tree.points[i].num_points;
            let num_points = origin_points
                + neighbors
                    .iter()
                    .filter(|&&k| !tree.points[k].visited(zoom))
                    .map(|&k| tree.points[k].num_points)
                    .sum::<u64>();

            if num_points > origin_points && num_points >= min_points {
                let mut wx = x * origin_points as f64;
                let mut wy = y * origin_points as f64;
                let id = ((i as u64) << 5) + (zoom as u64 + 1) + input_len;
                let mut accumulated: Option<JsonObject> = None;

                for &k in &neighbors {
                    if tree.points[k].visited(zoom) {
                        continue;
                    }
                    let neighbor = &mut tree.points[k];
                    neighbor.zoom = Some(zoom);
                    neighbor.parent = Some(id);
                    let weight = neighbor.num_points as f64;
                    wx += neighbor.x * weight;
                    wy += neighbor.y * weight;

                    if let Some(aggregates) = &self.aggregates {
                        let seed = accumulated.get_or_insert_with(|| {
                            map_properties(&tree.points[i], aggregates, &self.points, &self.cluster_props)
                        });
                        let mapped =
                            map_properties(&tree.points[k], aggregates, &self.points, &self.cluster_props);
                        aggregates.reduce(seed, &mapped);
                    }
                }

                tree.points[i].parent = Some(id);
                let props = accumulated.map(|props| {
                    self.cluster_props.push(props);
                    self.cluster_props.len() - 1
                });
                next.push(ClusterPoint {
                    x: wx / num_points as f64,
                    y: wy / num_points as f64,
                    zoom: None,
                    id,
                    parent: None,
                    num_points,
                    props,
                });
            } else {
                next.push(tree.points[i].clone());
                if num_points > 1 {
                    for &k in &neighbors {
                        if tree.points[k].visited(zoom) {
                            continue;
                        }
                        tree.points[k].zoom = Some(zoom);
                        next.push(tree.points[k].clone());
                    }
                }
            }
        }
        next
    }

    fn limit_zoom(&self, zoom: u8) -> usize {
        zoom.min(self.options.max_zoom + 1).max(self.options.min_zoom) as usize
    }

    fn tree(&self, zoom: usize) -> Option<&ClusterTree> {
        self.trees.get(zoom).and_then(Option::as_ref)
    }

    /// Clusters and points inside `[west, south, east, north]` at `zoom`.
    pub fn get_clusters(&self, bbox: [f64; 4], zoom: u8) -> Vec<Feature> {
        let wrap_lng = |lng: f64| ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
        let mut min_lng = wrap_lng(bbox[0]);
        let min_lat = bbox[1].clamp(-90.0, 90.0);
        let mut max_lng = if bbox[2] == 180.0 { 180.0 } else { wrap_lng(bbox[2]) };
        let max_lat = bbox[3].clamp(-90.0, 90.0);

        if bbox[2] - bbox[0] >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut eastern = self.get_clusters([min_lng, min_lat, 180.0, max_lat], zoom);
            eastern.extend(self.get_clusters([-180.0, min_lat, max_lng, max_lat], zoom));
            return eastern;
        }

        let Some(tree) = self.tree(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        tree.index
            .range(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat))
            .into_iter()
            .map(|k| self.point_feature(&tree.points[k]))
            .collect()
    }

    fn origin(&self, cluster_id: u64) -> Result<(usize, usize)> {
        let offset = cluster_id
            .checked_sub(self.points.len() as u64)
            .ok_or(TilerError::UnknownCluster(cluster_id))?;
        Ok(((offset >> 5) as usize, (offset % 32) as usize))
    }

    fn children(&self, cluster_id: u64) -> Result<Vec<&ClusterPoint>> {
        let (origin_id, origin_zoom) = self.origin(cluster_id)?;
        let tree = self
            .tree(origin_zoom)
            .ok_or(TilerError::UnknownCluster(cluster_id))?;
        let origin = tree
            .points
            .get(origin_id)
            .ok_or(TilerError::UnknownCluster(cluster_id))?;

        let radius = self.options.radius
            / (self.options.extent * 2f64.powi(origin_zoom as i32 - 1));
        let children: Vec<&ClusterPoint> = tree
            .index
            .within(origin.x, origin.y, radius)
            .into_iter()
            .map(|k| &tree.points[k])
            .filter(|point| point.parent == Some(cluster_id))
            .collect();
        if children.is_empty() {
            return Err(TilerError::UnknownCluster(cluster_id));
        }
        Ok(children)
    }

    /// Direct children of a cluster, one zoom level finer.
    pub fn get_children(&self, cluster_id: u64) -> Result<Vec<Feature>> {
        Ok(self
            .children(cluster_id)?
            .into_iter()
            .map(|point| self.point_feature(point))
            .collect())
    }

    /// Input features under a cluster, paginated. A `limit` of zero means
    /// [`DEFAULT_LEAVES_LIMIT`].
    pub fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Result<Vec<Feature>> {
        let limit = if limit == 0 { DEFAULT_LEAVES_LIMIT } else { limit };
        let mut leaves = Vec::new();
        self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;
        Ok(leaves)
    }

    fn append_leaves(
        &self,
        result: &mut Vec<Feature>,
        cluster_id: u64,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize> {
        for child in self.children(cluster_id)? {
            if child.is_cluster() {
                let count = child.num_points as usize;
                if skipped + count <= offset {
                    skipped += count;
                } else {
                    skipped = self.append_leaves(result, child.id, limit, offset, skipped)?;
                }
            } else if skipped < offset {
                skipped += 1;
            } else {
                result.push(self.point_feature(child));
            }
            if result.len() >= limit {
                break;
            }
        }
        Ok(skipped)
    }

    /// First zoom at which the cluster splits into more than one feature.
    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8> {
        let (_, origin_zoom) = self.origin(cluster_id)?;
        let mut expansion_zoom = origin_zoom as i32 - 1;
        let mut cluster_id = cluster_id;
        while expansion_zoom <= self.options.max_zoom as i32 {
            let children = self.children(cluster_id)?;
            expansion_zoom += 1;
            match children.as_slice() {
                [only] if only.is_cluster() => cluster_id = only.id,
                _ => break,
            }
        }
        Ok(expansion_zoom.max(0) as u8)
    }

    /// Points and clusters of tile `z/x/y` in tile-local coordinates, or
    /// `None` when the tile is empty.
    pub fn get_tile(&self, z: u8, x: u32, y: u32) -> Option<Vec<TileFeature>> {
        let tree = self.tree(self.limit_zoom(z))?;
        let z2 = 2f64.powi(z as i32);
        let p = self.options.radius / self.options.extent;
        let (xf, yf) = (x as f64, y as f64);
        let top = (yf - p) / z2;
        let bottom = (yf + 1.0 + p) / z2;

        let mut features = Vec::new();
        let ids = tree.index.range((xf - p) / z2, top, (xf + 1.0 + p) / z2, bottom);
        self.add_tile_features(&mut features, tree, &ids, xf, yf, z2);
        if x == 0 {
            let ids = tree.index.range(1.0 - p / z2, top, 1.0, bottom);
            self.add_tile_features(&mut features, tree, &ids, z2, yf, z2);
        }
        if x as f64 == z2 - 1.0 {
            let ids = tree.index.range(0.0, top, p / z2, bottom);
            self.add_tile_features(&mut features, tree, &ids, -1.0, yf, z2);
        }
        (!features.is_empty()).then_some(features)
    }

    fn add_tile_features(
        &self,
        out: &mut Vec<TileFeature>,
        tree: &ClusterTree,
        ids: &[usize],
        x: f64,
        y: f64,
        z2: f64,
    ) {
        let extent = self.options.extent;
        for &k in ids {
            let point = &tree.points[k];
            let (tags, px, py, id) = if point.is_cluster() {
                let tags = self.cluster_properties(point);
                (tags, point.x, point.y, Some(Id::Number(Number::from(point.id))))
            } else {
                let feature = &self.points[point.id as usize];
                let Some((lng, lat)) = point_coordinates(feature) else {
                    continue;
                };
                let id = if self.options.generate_id {
                    Some(Id::Number(Number::from(point.id)))
                } else {
                    feature.id.clone()
                };
                (
                    feature.properties.clone().unwrap_or_default(),
                    lng_x(lng),
                    lat_y(lat),
                    id,
                )
            };
            out.push(TileFeature {
                id,
                kind: TileGeomType::Point,
                geometry: TileGeometry::Local(vec![vec![[
                    round_half_up(extent * (px * z2 - x)),
                    round_half_up(extent * (py * z2 - y)),
                ]]]),
                tags: Arc::new(tags),
            });
        }
    }

    fn point_feature(&self, point: &ClusterPoint) -> Feature {
        if !point.is_cluster() {
            if let Some(feature) = self.points.get(point.id as usize) {
                return feature.clone();
            }
        }
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::Point(vec![
                x_lng(point.x),
                y_lat(point.y),
            ]))),
            id: Some(Id::Number(Number::from(point.id))),
            properties: Some(self.cluster_properties(point)),
            foreign_members: None,
        }
    }

    fn cluster_properties(&self, point: &ClusterPoint) -> JsonObject {
        let count = point.num_points;
        let mut properties = point
            .props
            .and_then(|index| self.cluster_props.get(index).cloned())
            .unwrap_or_default();
        properties.insert("cluster".to_string(), Value::Bool(true));
        properties.insert("cluster_id".to_string(), Value::from(point.id));
        properties.insert("point_count".to_string(), Value::from(count));
        properties.insert(
            "point_count_abbreviated".to_string(),
            abbreviate_count(count),
        );
        properties
    }
}

fn map_properties(
    point: &ClusterPoint,
    aggregates: &ClusterProperties,
    points: &[Feature],
    cluster_props: &[JsonObject],
) -> JsonObject {
    if point.is_cluster() {
        return point
            .props
            .and_then(|index| cluster_props.get(index).cloned())
            .unwrap_or_default();
    }
    let properties = points
        .get(point.id as usize)
        .and_then(|feature| feature.properties.clone())
        .unwrap_or_default();
    aggregates.map(&properties)
}

/// `point_count_abbreviated`: `12k` above ten thousand, `1.5k` above a thousand.
pub fn abbreviate_count(count: u64) -> Value {
    if count >= 10_000 {
        Value::String(format!("{}k", (count as f64 / 1000.0).round()))
    } else if count >= 1000 {
        Value::String(format!("{}k", (count as f64 / 100.0).round() / 10.0))
    } else {
        Value::from(count)
    }
}

fn point_coordinates(feature: &Feature) -> Option<(f64, f64)> {
    match &feature.geometry.as_ref()?.value {
        geojson::Value::Point(position) => match position.as_slice() {
            [lng, lat, ..] => Some((*lng, *lat)),
            _ => None,
        },
        _ => None,
    }
}
