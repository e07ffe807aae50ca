use std::sync::Arc;

use geojson::JsonObject;
use geojson::feature::Id;

/// Number of values stored per vertex: x, y and the simplification weight.
pub const STRIDE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtGeomType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

/// A flat `[x, y, weight]*` vertex buffer for one line or ring.
///
/// `size` is the line length (or the ring area for polygons) in projected
/// units; `start`/`end` delimit the slice of the original line this piece
/// covers once clipping has split it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VtLine {
    pub coords: Vec<f64>,
    pub size: f64,
    pub start: f64,
    pub end: f64,
}

impl VtLine {
    pub fn new(coords: Vec<f64>) -> Self {
        Self {
            coords,
            size: 0.0,
            start: 0.0,
            end: 0.0,
        }
    }

    /// An empty buffer sharing this line's metrics.
    pub fn empty_slice(&self) -> Self {
        Self {
            coords: Vec::new(),
            size: self.size,
            start: self.start,
            end: self.end,
        }
    }

    pub fn push(&mut self, x: f64, y: f64, weight: f64) {
        self.coords.extend_from_slice(&[x, y, weight]);
    }

    pub fn num_points(&self) -> usize {
        self.coords.len() / STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Projected geometry of a prepared feature.
#[derive(Debug, Clone, PartialEq)]
pub enum VtGeometry {
    Point(Vec<f64>),
    MultiPoint(Vec<f64>),
    LineString(VtLine),
    MultiLineString(Vec<VtLine>),
    Polygon(Vec<VtLine>),
    MultiPolygon(Vec<Vec<VtLine>>),
}

impl VtGeometry {
    pub fn geom_type(&self) -> VtGeomType {
        match self {
            VtGeometry::Point(_) => VtGeomType::Point,
            VtGeometry::MultiPoint(_) => VtGeomType::MultiPoint,
            VtGeometry::LineString(_) => VtGeomType::LineString,
            VtGeometry::MultiLineString(_) => VtGeomType::MultiLineString,
            VtGeometry::Polygon(_) => VtGeomType::Polygon,
            VtGeometry::MultiPolygon(_) => VtGeomType::MultiPolygon,
        }
    }

    /// Applies `f` to every vertex buffer of the geometry.
    pub fn map_buffers(&self, mut f: impl FnMut(&[f64]) -> Vec<f64>) -> VtGeometry {
        fn map_line(line: &VtLine, f: &mut dyn FnMut(&[f64]) -> Vec<f64>) -> VtLine {
            VtLine {
                coords: f(&line.coords),
                size: line.size,
                start: line.start,
                end: line.end,
            }
        }
        match self {
            VtGeometry::Point(coords) => VtGeometry::Point(f(coords)),
            VtGeometry::MultiPoint(coords) => VtGeometry::MultiPoint(f(coords)),
            VtGeometry::LineString(line) => VtGeometry::LineString(map_line(line, &mut f)),
            VtGeometry::MultiLineString(lines) => VtGeometry::MultiLineString(
                lines.iter().map(|line| map_line(line, &mut f)).collect(),
            ),
            VtGeometry::Polygon(rings) => {
                VtGeometry::Polygon(rings.iter().map(|ring| map_line(ring, &mut f)).collect())
            }
            VtGeometry::MultiPolygon(polygons) => VtGeometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| rings.iter().map(|ring| map_line(ring, &mut f)).collect())
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub const EMPTY: Bbox = Bbox {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };

    pub fn extend_coords(&mut self, coords: &[f64]) {
        for vertex in coords.chunks_exact(STRIDE) {
            self.min_x = self.min_x.min(vertex[0]);
            self.min_y = self.min_y.min(vertex[1]);
            self.max_x = self.max_x.max(vertex[0]);
            self.max_y = self.max_y.max(vertex[1]);
        }
    }

    pub fn merge(&mut self, other: &Bbox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Extent of the box along `axis` (0 = x, 1 = y).
    pub fn axis_range(&self, axis: usize) -> (f64, f64) {
        if axis == 0 {
            (self.min_x, self.max_x)
        } else {
            (self.min_y, self.max_y)
        }
    }
}

/// A projected, simplified feature ready for clipping.
#[derive(Debug, Clone)]
pub struct VtFeature {
    pub id: Option<Id>,
    pub geometry: VtGeometry,
    pub tags: Arc<JsonObject>,
    pub bbox: Bbox,
}

impl VtFeature {
    pub fn new(id: Option<Id>, geometry: VtGeometry, tags: Arc<JsonObject>) -> Self {
        let mut bbox = Bbox::EMPTY;
        match &geometry {
            VtGeometry::Point(coords) | VtGeometry::MultiPoint(coords) => {
                bbox.extend_coords(coords)
            }
            VtGeometry::LineString(line) => bbox.extend_coords(&line.coords),
            VtGeometry::MultiLineString(lines) => {
                for line in lines {
                    bbox.extend_coords(&line.coords);
                }
            }
            // Holes never reach outside the outer ring.
            VtGeometry::Polygon(rings) => {
                if let Some(outer) = rings.first() {
                    bbox.extend_coords(&outer.coords);
                }
            }
            VtGeometry::MultiPolygon(polygons) => {
                for outer in polygons.iter().filter_map(|rings| rings.first()) {
                    bbox.extend_coords(&outer.coords);
                }
            }
        }
        Self {
            id,
            geometry,
            tags,
            bbox,
        }
    }

    pub fn geom_type(&self) -> VtGeomType {
        self.geometry.geom_type()
    }
}
