use std::f64::consts::PI;
use std::sync::Arc;

use geojson::feature::Id;
use geojson::{Feature, JsonObject, Position};
use serde_json::Number;

use crate::error::{Result, TilerError};
use crate::input::id_from_value;
use crate::options::TilerOptions;
use crate::tiler::simplify::simplify;
use crate::tiler::tile::rewind;
use crate::tiler::types::{STRIDE, VtFeature, VtGeometry, VtLine};

/// Longitude to unit-square mercator x.
pub fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Latitude to unit-square mercator y, clamped to `[0, 1]`.
pub fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    if y.is_nan() {
        return if lat > 0.0 { 0.0 } else { 1.0 };
    }
    y.clamp(0.0, 1.0)
}

pub fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

pub fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

/// Squared simplification tolerance in unit-square space for `options`.
pub fn sq_tolerance(options: &TilerOptions) -> f64 {
    let tolerance =
        options.tolerance / ((1u64 << options.max_zoom) as f64 * options.extent as f64);
    tolerance * tolerance
}

/// Projects and simplifies input features into prepared features.
pub fn convert(features: &[Feature], options: &TilerOptions) -> Result<Vec<Arc<VtFeature>>> {
    let tolerance = sq_tolerance(options);
    let mut out = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let id = match (&options.promote_id, options.generate_id) {
            (Some(key), _) => feature
                .properties
                .as_ref()
                .and_then(|props| props.get(key))
                .and_then(id_from_value),
            (None, true) => Some(Id::Number(Number::from(index as u64))),
            (None, false) => feature.id.clone(),
        };
        let tags = Arc::new(feature.properties.clone().unwrap_or_default());
        convert_geometry(&mut out, &geometry.value, id, &tags, tolerance, options)?;
    }
    Ok(out)
}

fn convert_geometry(
    out: &mut Vec<Arc<VtFeature>>,
    value: &geojson::Value,
    id: Option<Id>,
    tags: &Arc<JsonObject>,
    tolerance: f64,
    options: &TilerOptions,
) -> Result<()> {
    let geometry = match value {
        // Features without coordinates are skipped.
        geojson::Value::Point(position) if position.is_empty() => return Ok(()),
        geojson::Value::Point(position) => {
            let mut coords = Vec::with_capacity(STRIDE);
            convert_point(position, &mut coords)?;
            VtGeometry::Point(coords)
        }
        geojson::Value::MultiPoint(positions) => {
            let mut coords = Vec::with_capacity(positions.len() * STRIDE);
            for position in positions.iter().filter(|position| !position.is_empty()) {
                convert_point(position, &mut coords)?;
            }
            if coords.is_empty() {
                return Ok(());
            }
            VtGeometry::MultiPoint(coords)
        }
        geojson::Value::LineString(positions) => {
            VtGeometry::LineString(convert_line(positions, tolerance, None)?)
        }
        geojson::Value::MultiLineString(lines) => {
            if options.line_metrics {
                // Each line keeps its own length so clipped pieces can report their position.
                for positions in lines {
                    let line = convert_line(positions, tolerance, None)?;
                    out.push(Arc::new(VtFeature::new(
                        id.clone(),
                        VtGeometry::LineString(line),
                        Arc::clone(tags),
                    )));
                }
                return Ok(());
            }
            VtGeometry::MultiLineString(convert_lines(lines, tolerance, false)?)
        }
        geojson::Value::Polygon(rings) => VtGeometry::Polygon(convert_lines(rings, tolerance, true)?),
        geojson::Value::MultiPolygon(polygons) => VtGeometry::MultiPolygon(
            polygons
                .iter()
                .map(|rings| convert_lines(rings, tolerance, true))
                .collect::<Result<Vec<_>>>()?,
        ),
        geojson::Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                convert_geometry(out, &geometry.value, id.clone(), tags, tolerance, options)?;
            }
            return Ok(());
        }
    };
    out.push(Arc::new(VtFeature::new(id, geometry, Arc::clone(tags))));
    Ok(())
}

fn convert_point(position: &Position, out: &mut Vec<f64>) -> Result<()> {
    let [lng, lat, ..] = position.as_slice() else {
        return Err(TilerError::invalid(
            "Input data is not a valid GeoJSON object: position needs two coordinates.",
        ));
    };
    out.extend_from_slice(&[lng_x(*lng), lat_y(*lat), 0.0]);
    Ok(())
}

/// `winding` is `Some(clockwise)` for polygon rings, `None` for lines.
fn convert_line(positions: &[Position], tolerance: f64, winding: Option<bool>) -> Result<VtLine> {
    let mut coords = Vec::with_capacity(positions.len() * STRIDE);
    for position in positions {
        convert_point(position, &mut coords)?;
    }
    if let Some(clockwise) = winding {
        rewind(&mut coords, STRIDE, clockwise);
    }

    let mut size = 0.0;
    for i in (STRIDE..coords.len()).step_by(STRIDE) {
        let (x0, y0) = (coords[i - STRIDE], coords[i - STRIDE + 1]);
        let (x, y) = (coords[i], coords[i + 1]);
        if winding.is_some() {
            size += (x0 * y - x * y0) / 2.0;
        } else {
            size += ((x - x0).powi(2) + (y - y0).powi(2)).sqrt();
        }
    }

    if let Some(last) = coords.len().checked_sub(STRIDE) {
        coords[2] = 1.0;
        simplify(&mut coords, 0, last, tolerance);
        coords[last + 2] = 1.0;
    }

    let size = size.abs();
    Ok(VtLine {
        coords,
        size,
        start: 0.0,
        end: size,
    })
}

fn convert_lines(lines: &[Vec<Position>], tolerance: f64, is_polygon: bool) -> Result<Vec<VtLine>> {
    lines
        .iter()
        .enumerate()
        .map(|(index, positions)| {
            // Outer rings are clockwise in y-down space, holes the opposite.
            let winding = is_polygon.then_some(index == 0);
            convert_line(positions, tolerance, winding)
        })
        .collect()
}
