use std::collections::{BTreeMap, BTreeSet};

use geo_types::{Geometry, LineString};
use geojson::JsonObject;
use geojson::feature::Id;
use mvt::{GeomData, GeomEncoder, GeomType, Tile};
use mvt_reader::Reader;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TilerError};
use crate::tiler::tile::{TileFeature, TileGeomType};

/// Name of the single layer every GeoJSON tile is written to.
pub const GEOJSON_TILE_LAYER_NAME: &str = "_geojsonTileLayer";

/// Layer version written by the encoder.
pub const TILE_LAYER_VERSION: u32 = 2;

/// A property value with its wire type decided up front.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Float(f32),
    Double(f64),
}

impl TagValue {
    /// `null` has no wire form; arrays and objects travel as JSON text.
    pub fn from_json(value: &Value) -> Option<TagValue> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(TagValue::Str(text.clone())),
            Value::Bool(flag) => Some(TagValue::Bool(*flag)),
            Value::Number(number) => {
                if let Some(unsigned) = number.as_u64() {
                    return Some(TagValue::UInt(unsigned));
                }
                if let Some(signed) = number.as_i64() {
                    return Some(TagValue::SInt(signed));
                }
                let float = number.as_f64()?;
                if float.fract() != 0.0 || !float.is_finite() {
                    Some(TagValue::Double(float))
                } else if float < 0.0 {
                    Some(TagValue::SInt(float as i64))
                } else {
                    Some(TagValue::UInt(float as u64))
                }
            }
            Value::Array(_) | Value::Object(_) => Some(TagValue::Str(value.to_string())),
        }
    }

    fn from_reader(value: &mvt_reader::feature::Value) -> Option<TagValue> {
        use mvt_reader::feature::Value as ReaderValue;
        match value {
            ReaderValue::String(text) => Some(TagValue::Str(text.clone())),
            ReaderValue::Float(val) => Some(TagValue::Float(*val)),
            ReaderValue::Double(val) => Some(TagValue::Double(*val)),
            ReaderValue::Int(val) => Some(TagValue::Int(*val)),
            ReaderValue::UInt(val) => Some(TagValue::UInt(*val)),
            ReaderValue::SInt(val) => Some(TagValue::SInt(*val)),
            ReaderValue::Bool(val) => Some(TagValue::Bool(*val)),
            ReaderValue::Null => None,
        }
    }
}

/// Wire id of a feature: unsigned integers and strings that parse as one.
pub fn wire_id(id: &Id) -> Option<u64> {
    match id {
        Id::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.fract() == 0.0 && *value >= 0.0)
                .map(|value| value as u64)
        }),
        Id::String(text) => text.trim().parse::<u64>().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorFeature {
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: u32,
    pub properties: BTreeMap<String, TagValue>,
    /// One ring per point for points, otherwise one ring per line or polygon ring.
    pub geometry: Vec<Vec<[i32; 2]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorLayer {
    pub name: String,
    pub extent: u32,
    pub version: u32,
    pub features: Vec<MirrorFeature>,
}

/// In-memory form of an encoded tile, as handed to feature lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VectorTileMirror {
    pub layers: BTreeMap<String, MirrorLayer>,
}

/// An encoded GeoJSON tile together with its in-memory mirror.
#[derive(Debug, Clone)]
pub struct GeoJsonTileResult {
    pub vector_tile: VectorTileMirror,
    pub raw_data: Vec<u8>,
}

/// Builds the single-layer mirror of a materialized tile. Rings that cannot
/// form a valid geometry are dropped, as are features left without any.
///
/// Geometry is reduced to the vertices the wire encoder keeps, so the mirror
/// matches what a reader decodes from the encoded bytes.
pub fn build_mirror(features: &[TileFeature], extent: u32) -> VectorTileMirror {
    let mut mirrored = Vec::with_capacity(features.len());
    for feature in features {
        let rings = feature.local_rings();
        let geometry = match feature.kind {
            TileGeomType::Point => canonical_points(rings),
            TileGeomType::LineString => canonical_lines(rings),
            TileGeomType::Polygon => canonical_rings(rings),
        };
        if geometry.is_empty() {
            continue;
        }
        let properties = feature
            .tags
            .iter()
            .filter_map(|(key, value)| TagValue::from_json(value).map(|tag| (key.clone(), tag)))
            .collect();
        mirrored.push(MirrorFeature {
            id: feature.id.as_ref().and_then(wire_id),
            kind: feature.kind.code(),
            properties,
            geometry,
        });
    }

    let mut tile = VectorTileMirror::default();
    tile.layers.insert(
        GEOJSON_TILE_LAYER_NAME.to_string(),
        MirrorLayer {
            name: GEOJSON_TILE_LAYER_NAME.to_string(),
            extent,
            version: TILE_LAYER_VERSION,
            features: mirrored,
        },
    );
    tile
}

/// Encodes a materialized tile's features into a single-layer vector tile.
pub fn encode_tile(features: &[TileFeature], extent: u32) -> Result<GeoJsonTileResult> {
    let vector_tile = build_mirror(features, extent);
    let raw_data = encode_mirror(&vector_tile)?;
    Ok(GeoJsonTileResult {
        vector_tile,
        raw_data,
    })
}

/// Serializes a mirror to wire bytes.
pub fn encode_mirror(mirror: &VectorTileMirror) -> Result<Vec<u8>> {
    let extent = mirror
        .layers
        .values()
        .next()
        .map(|layer| layer.extent)
        .unwrap_or(4096);
    let mut tile = Tile::new(extent);
    for layer in mirror.layers.values() {
        let mut layer_builder = tile.create_layer(&layer.name);
        for feature in &layer.features {
            let geom_data = encode_geometry(feature.kind, &feature.geometry)?;
            let mut feature_builder = layer_builder.into_feature(geom_data);
            if let Some(id) = feature.id {
                feature_builder.set_id(id);
            }
            for (key, value) in &feature.properties {
                match value {
                    TagValue::Str(text) => feature_builder.add_tag_string(key, text),
                    TagValue::Bool(val) => feature_builder.add_tag_bool(key, *val),
                    TagValue::Int(val) => feature_builder.add_tag_int(key, *val),
                    TagValue::UInt(val) => feature_builder.add_tag_uint(key, *val),
                    TagValue::SInt(val) => feature_builder.add_tag_sint(key, *val),
                    TagValue::Float(val) => feature_builder.add_tag_float(key, *val),
                    TagValue::Double(val) => feature_builder.add_tag_double(key, *val),
                }
            }
            layer_builder = feature_builder.into_layer();
        }
        tile.add_layer(layer_builder)?;
    }
    Ok(tile.to_bytes()?)
}

fn encode_geometry(kind: u32, rings: &[Vec<[i32; 2]>]) -> Result<GeomData> {
    let geom_type = match kind {
        1 => GeomType::Point,
        2 => GeomType::Linestring,
        3 => GeomType::Polygon,
        other => {
            return Err(TilerError::Encode(format!("unknown geometry type {other}")));
        }
    };
    let mut encoder = GeomEncoder::new(geom_type);
    let point_groups = matches!(geom_type, GeomType::Point);
    for (idx, ring) in rings.iter().enumerate() {
        for &[x, y] in ring {
            encoder.add_point(x as f32, y as f32)?;
        }
        if !point_groups && idx + 1 < rings.len() {
            encoder.complete_geom()?;
        }
    }
    Ok(encoder.encode()?)
}

/// Points with consecutive repeats removed, one ring per point.
fn canonical_points(rings: &[Vec<[i32; 2]>]) -> Vec<Vec<[i32; 2]>> {
    let mut points: Vec<[i32; 2]> = Vec::new();
    for &point in rings.iter().flatten() {
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    points.into_iter().map(|point| vec![point]).collect()
}

/// Lines without repeated vertices. A line starting where the previous one
/// ended continues it, as the encoder writes no new move-to for it.
fn canonical_lines(rings: &[Vec<[i32; 2]>]) -> Vec<Vec<[i32; 2]>> {
    let mut lines: Vec<Vec<[i32; 2]>> = Vec::new();
    for line in rings {
        let mut line = dedup(line);
        if line.len() < 2 {
            continue;
        }
        match lines.last_mut() {
            Some(previous) if previous.last() == line.first() => {
                previous.extend(line.drain(1..));
            }
            _ => lines.push(line),
        }
    }
    lines
}

/// Open polygon rings without repeated vertices or axis-aligned midpoints.
/// A ring starting on the previous ring's last vertex is rotated by one.
fn canonical_rings(rings: &[Vec<[i32; 2]>]) -> Vec<Vec<[i32; 2]>> {
    let mut out: Vec<Vec<[i32; 2]>> = Vec::new();
    for ring in rings {
        let mut ring = dedup(open_ring(ring));
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            continue;
        }
        if out.last().and_then(|previous| previous.last()) == ring.first() {
            ring.rotate_left(1);
        }
        let mut kept: Vec<[i32; 2]> = Vec::with_capacity(ring.len());
        for point in ring {
            if kept.len() >= 2 && axis_collinear(kept[kept.len() - 2], kept[kept.len() - 1], point) {
                kept.pop();
            }
            kept.push(point);
        }
        if kept.len() >= 3 {
            out.push(kept);
        }
    }
    out
}

fn dedup(points: &[[i32; 2]]) -> Vec<[i32; 2]> {
    let mut out: Vec<[i32; 2]> = Vec::with_capacity(points.len());
    for &point in points {
        if out.last() != Some(&point) {
            out.push(point);
        }
    }
    out
}

/// `b` lies strictly between `a` and `c` on a shared horizontal or vertical.
fn axis_collinear(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> bool {
    if a[0] == b[0] && b[0] == c[0] {
        return (a[1] < b[1] && b[1] < c[1]) || (a[1] > b[1] && b[1] > c[1]);
    }
    if a[1] == b[1] && b[1] == c[1] {
        return (a[0] < b[0] && b[0] < c[0]) || (a[0] > b[0] && b[0] > c[0]);
    }
    false
}

fn open_ring(ring: &[[i32; 2]]) -> &[[i32; 2]] {
    if ring.len() > 1 && ring.first() == ring.last() {
        &ring[..ring.len() - 1]
    } else {
        ring
    }
}

fn reader_rings(line: &LineString<f32>, closed: bool) -> Vec<[i32; 2]> {
    let coords = line.0.as_slice();
    let coords = if closed && coords.len() > 1 && coords.first() == coords.last() {
        &coords[..coords.len() - 1]
    } else {
        coords
    };
    coords
        .iter()
        .map(|coord| [coord.x.round() as i32, coord.y.round() as i32])
        .collect()
}

fn decode_geometry(geometry: &Geometry<f32>) -> Result<(u32, Vec<Vec<[i32; 2]>>)> {
    let point = |x: f32, y: f32| vec![[x.round() as i32, y.round() as i32]];
    Ok(match geometry {
        Geometry::Point(p) => (1, vec![point(p.x(), p.y())]),
        Geometry::MultiPoint(points) => (1, points.iter().map(|p| point(p.x(), p.y())).collect()),
        Geometry::LineString(line) => (2, vec![reader_rings(line, false)]),
        Geometry::MultiLineString(lines) => {
            (2, lines.iter().map(|line| reader_rings(line, false)).collect())
        }
        Geometry::Polygon(polygon) => {
            let mut rings = vec![reader_rings(polygon.exterior(), true)];
            rings.extend(polygon.interiors().iter().map(|ring| reader_rings(ring, true)));
            (3, rings)
        }
        Geometry::MultiPolygon(polygons) => {
            let mut rings = Vec::new();
            for polygon in polygons {
                rings.push(reader_rings(polygon.exterior(), true));
                rings.extend(polygon.interiors().iter().map(|ring| reader_rings(ring, true)));
            }
            (3, rings)
        }
        _ => {
            return Err(TilerError::Encode(
                "unsupported geometry in decoded tile".to_string(),
            ));
        }
    })
}

/// Decodes wire bytes back into a mirror.
pub fn decode_tile(bytes: &[u8]) -> Result<VectorTileMirror> {
    let reader = Reader::new(bytes.to_vec())
        .map_err(|err| TilerError::Encode(format!("decode vector tile: {err}")))?;
    let layers = reader
        .get_layer_metadata()
        .map_err(|err| TilerError::Encode(format!("read layer metadata: {err}")))?;

    let mut mirror = VectorTileMirror::default();
    for layer in layers {
        let features = reader
            .get_features(layer.layer_index)
            .map_err(|err| TilerError::Encode(format!("read layer features: {err}")))?;
        let mut decoded = Vec::with_capacity(features.len());
        for feature in &features {
            let (kind, geometry) = decode_geometry(feature.get_geometry())?;
            let properties = feature
                .properties
                .as_ref()
                .map(|props| {
                    props
                        .iter()
                        .filter_map(|(key, value)| {
                            TagValue::from_reader(value).map(|tag| (key.clone(), tag))
                        })
                        .collect()
                })
                .unwrap_or_default();
            decoded.push(MirrorFeature {
                id: feature.id,
                kind,
                properties,
                geometry,
            });
        }
        mirror.layers.insert(
            layer.name.clone(),
            MirrorLayer {
                name: layer.name.clone(),
                extent: layer.extent,
                version: TILE_LAYER_VERSION,
                features: decoded,
            },
        );
    }
    Ok(mirror)
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub extent: u32,
    pub feature_count: usize,
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub keys: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TileSummary {
    pub bytes: usize,
    pub layers: Vec<LayerSummary>,
}

/// Per-layer feature and property-key counts of an encoded tile.
pub fn summarize_tile(bytes: &[u8]) -> Result<TileSummary> {
    let mirror = decode_tile(bytes)?;
    let layers = mirror
        .layers
        .into_values()
        .map(|layer| {
            let count = |kind: u32| layer.features.iter().filter(|f| f.kind == kind).count();
            LayerSummary {
                extent: layer.extent,
                feature_count: layer.features.len(),
                points: count(1),
                lines: count(2),
                polygons: count(3),
                keys: layer
                    .features
                    .iter()
                    .flat_map(|feature| feature.properties.keys().cloned())
                    .collect(),
                name: layer.name,
            }
        })
        .collect();
    Ok(TileSummary {
        bytes: bytes.len(),
        layers,
    })
}

/// Tags of a feature as a JSON object, for printing.
pub fn tags_to_json(properties: &BTreeMap<String, TagValue>) -> JsonObject {
    properties
        .iter()
        .map(|(key, value)| {
            let json = serde_json::to_value(value).unwrap_or(Value::Null);
            (key.clone(), json)
        })
        .collect()
}
