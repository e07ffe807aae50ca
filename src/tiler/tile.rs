use std::sync::Arc;

use geojson::JsonObject;
use geojson::feature::Id;
use serde_json::Value;

use crate::options::TilerOptions;
use crate::tiler::types::{Bbox, STRIDE, VtFeature, VtGeometry, VtLine};

/// Property names carrying the clipped slice of the original line.
pub const CLIP_START_TAG: &str = "clip_start";
pub const CLIP_END_TAG: &str = "clip_end";

/// Geometry kind as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileGeomType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

impl TileGeomType {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Feature geometry, either still in unit-square space or already in
/// tile-local integer coordinates. Points are held as a single group.
#[derive(Debug, Clone, PartialEq)]
pub enum TileGeometry {
    Projected(Vec<Vec<[f64; 2]>>),
    Local(Vec<Vec<[i32; 2]>>),
}

#[derive(Debug, Clone)]
pub struct TileFeature {
    pub id: Option<Id>,
    pub kind: TileGeomType,
    pub geometry: TileGeometry,
    pub tags: Arc<JsonObject>,
}

impl TileFeature {
    /// Tile-local rings, empty until the owning tile was transformed.
    pub fn local_rings(&self) -> &[Vec<[i32; 2]>] {
        match &self.geometry {
            TileGeometry::Local(rings) => rings,
            TileGeometry::Projected(_) => &[],
        }
    }
}

/// One quad-tree node.
#[derive(Debug, Clone)]
pub struct Tile {
    pub features: Vec<TileFeature>,
    pub num_features: usize,
    pub num_points: usize,
    pub num_simplified: usize,
    pub bbox: Bbox,
    pub z: u8,
    pub x: u32,
    pub y: u32,
    /// Clipped input retained until the node is split.
    pub source: Option<Vec<Arc<VtFeature>>>,
    pub transformed: bool,
}

impl Tile {
    /// Materializes the features of node `z/x/y`, dropping detail the zoom cannot show.
    pub fn create(features: &[Arc<VtFeature>], z: u8, x: u32, y: u32, options: &TilerOptions) -> Tile {
        let tolerance = if z == options.max_zoom {
            0.0
        } else {
            options.tolerance / ((1u64 << z) as f64 * options.extent as f64)
        };
        let mut tile = Tile {
            features: Vec::new(),
            num_features: features.len(),
            num_points: 0,
            num_simplified: 0,
            bbox: Bbox {
                min_x: 2.0,
                min_y: 1.0,
                max_x: -1.0,
                max_y: 0.0,
            },
            z,
            x,
            y,
            source: None,
            transformed: false,
        };
        for feature in features {
            tile.add_feature(feature, tolerance, options.line_metrics);
        }
        tile
    }

    fn add_feature(&mut self, feature: &VtFeature, tolerance: f64, line_metrics: bool) {
        self.bbox.merge(&feature.bbox);

        let mut rings = Vec::new();
        let kind = match &feature.geometry {
            VtGeometry::Point(coords) | VtGeometry::MultiPoint(coords) => {
                let points: Vec<[f64; 2]> = coords
                    .chunks_exact(STRIDE)
                    .map(|vertex| [vertex[0], vertex[1]])
                    .collect();
                self.num_points += points.len();
                self.num_simplified += points.len();
                if !points.is_empty() {
                    rings.push(points);
                }
                TileGeomType::Point
            }
            VtGeometry::LineString(line) => {
                self.add_line(&mut rings, line, tolerance, None);
                TileGeomType::LineString
            }
            VtGeometry::MultiLineString(lines) => {
                for line in lines {
                    self.add_line(&mut rings, line, tolerance, None);
                }
                TileGeomType::LineString
            }
            VtGeometry::Polygon(polygon) => {
                for (index, ring) in polygon.iter().enumerate() {
                    self.add_line(&mut rings, ring, tolerance, Some(index == 0));
                }
                TileGeomType::Polygon
            }
            VtGeometry::MultiPolygon(polygons) => {
                for polygon in polygons {
                    for (index, ring) in polygon.iter().enumerate() {
                        self.add_line(&mut rings, ring, tolerance, Some(index == 0));
                    }
                }
                TileGeomType::Polygon
            }
        };

        if rings.is_empty() {
            return;
        }

        let tags = match &feature.geometry {
            VtGeometry::LineString(line) if line_metrics => {
                let mut tags = (*feature.tags).clone();
                tags.insert(CLIP_START_TAG.to_string(), metric(line.start / line.size));
                tags.insert(CLIP_END_TAG.to_string(), metric(line.end / line.size));
                Arc::new(tags)
            }
            _ => Arc::clone(&feature.tags),
        };

        self.features.push(TileFeature {
            id: feature.id.clone(),
            kind,
            geometry: TileGeometry::Projected(rings),
            tags,
        });
    }

    /// `outer` is `Some(is_outer_ring)` for polygon rings.
    fn add_line(
        &mut self,
        rings: &mut Vec<Vec<[f64; 2]>>,
        line: &VtLine,
        tolerance: f64,
        outer: Option<bool>,
    ) {
        let sq_tolerance = tolerance * tolerance;
        let min_size = if outer.is_some() {
            sq_tolerance
        } else {
            tolerance
        };
        if tolerance > 0.0 && line.size < min_size {
            self.num_points += line.num_points();
            return;
        }

        let mut ring = Vec::with_capacity(line.coords.len() / STRIDE * 2);
        for vertex in line.coords.chunks_exact(STRIDE) {
            if tolerance == 0.0 || vertex[2] > sq_tolerance {
                self.num_simplified += 1;
                ring.extend_from_slice(&[vertex[0], vertex[1]]);
            }
            self.num_points += 1;
        }
        if let Some(is_outer) = outer {
            rewind(&mut ring, 2, is_outer);
        }
        rings.push(ring.chunks_exact(2).map(|pair| [pair[0], pair[1]]).collect());
    }

    /// Rescales every feature to tile-local integer coordinates. Runs once.
    pub fn transform(&mut self, extent: u32) {
        if self.transformed {
            return;
        }
        let z2 = (1u64 << self.z) as f64;
        let (tx, ty) = (self.x as f64, self.y as f64);
        let extent = extent as f64;
        for feature in &mut self.features {
            if let TileGeometry::Projected(rings) = &feature.geometry {
                let local = rings
                    .iter()
                    .map(|ring| {
                        ring.iter()
                            .map(|&[x, y]| {
                                [
                                    round_half_up(extent * (x * z2 - tx)),
                                    round_half_up(extent * (y * z2 - ty)),
                                ]
                            })
                            .collect()
                    })
                    .collect();
                feature.geometry = TileGeometry::Local(local);
            }
        }
        self.transformed = true;
    }
}

fn metric(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Rounds halves toward positive infinity.
pub fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Normalizes ring orientation in a flat buffer of `stride`-sized vertices.
///
/// With y pointing down, `clockwise` rings end up with a non-positive
/// `Σ(x_i - x_j)(y_i + y_j)`.
pub fn rewind(ring: &mut [f64], stride: usize, clockwise: bool) {
    let len = ring.len();
    if len < stride * 2 {
        return;
    }
    let mut area = 0.0;
    let mut j = len - stride;
    let mut i = 0;
    while i < len {
        area += (ring[i] - ring[j]) * (ring[i + 1] + ring[j + 1]);
        j = i;
        i += stride;
    }
    if (area > 0.0) == clockwise {
        let count = len / stride;
        for a in 0..count / 2 {
            let b = count - 1 - a;
            for k in 0..stride {
                ring.swap(a * stride + k, b * stride + k);
            }
        }
    }
}
