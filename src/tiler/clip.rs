use std::sync::Arc;

use crate::tiler::types::{STRIDE, VtFeature, VtGeometry, VtLine};

/// Clips features to the `[k1, k2]` window along `axis` (0 = x, 1 = y).
///
/// `k1`/`k2` are in tile units and are divided by `scale`; `min_all` and
/// `max_all` bound every feature along `axis` and allow accepting or
/// rejecting the whole set without looking at individual features.
/// Returns `None` when nothing survives.
#[allow(clippy::too_many_arguments)]
pub fn clip(
    features: &[Arc<VtFeature>],
    scale: f64,
    k1: f64,
    k2: f64,
    axis: usize,
    min_all: f64,
    max_all: f64,
    line_metrics: bool,
) -> Option<Vec<Arc<VtFeature>>> {
    let k1 = k1 / scale;
    let k2 = k2 / scale;

    if min_all >= k1 && max_all < k2 {
        return Some(features.to_vec());
    }
    if max_all < k1 || min_all >= k2 {
        return None;
    }

    let mut clipped = Vec::new();
    for feature in features {
        let (min, max) = feature.bbox.axis_range(axis);
        if min >= k1 && max < k2 {
            clipped.push(Arc::clone(feature));
            continue;
        }
        if max < k1 || min >= k2 {
            continue;
        }

        match &feature.geometry {
            VtGeometry::Point(coords) | VtGeometry::MultiPoint(coords) => {
                let points = clip_points(coords, k1, k2, axis);
                if !points.is_empty() {
                    let geometry = if points.len() == STRIDE {
                        VtGeometry::Point(points)
                    } else {
                        VtGeometry::MultiPoint(points)
                    };
                    clipped.push(derive(feature, geometry));
                }
            }
            VtGeometry::LineString(line) => {
                let mut pieces = Vec::new();
                clip_line(line, &mut pieces, k1, k2, axis, false, line_metrics);
                if line_metrics {
                    // Each piece keeps its own slice metrics.
                    for piece in pieces {
                        clipped.push(derive(feature, VtGeometry::LineString(piece)));
                    }
                } else if let Some(geometry) = collapse_lines(pieces) {
                    clipped.push(derive(feature, geometry));
                }
            }
            VtGeometry::MultiLineString(lines) => {
                let pieces = clip_lines(lines, k1, k2, axis, false);
                if let Some(geometry) = collapse_lines(pieces) {
                    clipped.push(derive(feature, geometry));
                }
            }
            VtGeometry::Polygon(rings) => {
                let rings = clip_lines(rings, k1, k2, axis, true);
                if !rings.is_empty() {
                    clipped.push(derive(feature, VtGeometry::Polygon(rings)));
                }
            }
            VtGeometry::MultiPolygon(polygons) => {
                let polygons: Vec<Vec<VtLine>> = polygons
                    .iter()
                    .map(|rings| clip_lines(rings, k1, k2, axis, true))
                    .filter(|rings| !rings.is_empty())
                    .collect();
                if !polygons.is_empty() {
                    clipped.push(derive(feature, VtGeometry::MultiPolygon(polygons)));
                }
            }
        }
    }

    (!clipped.is_empty()).then_some(clipped)
}

fn derive(feature: &VtFeature, geometry: VtGeometry) -> Arc<VtFeature> {
    Arc::new(VtFeature::new(
        feature.id.clone(),
        geometry,
        Arc::clone(&feature.tags),
    ))
}

fn collapse_lines(mut pieces: Vec<VtLine>) -> Option<VtGeometry> {
    match pieces.len() {
        0 => None,
        1 => pieces.pop().map(VtGeometry::LineString),
        _ => Some(VtGeometry::MultiLineString(pieces)),
    }
}

fn clip_points(coords: &[f64], k1: f64, k2: f64, axis: usize) -> Vec<f64> {
    let mut out = Vec::new();
    for vertex in coords.chunks_exact(STRIDE) {
        let a = vertex[axis];
        if a >= k1 && a <= k2 {
            out.extend_from_slice(vertex);
        }
    }
    out
}

fn clip_lines(lines: &[VtLine], k1: f64, k2: f64, axis: usize, is_polygon: bool) -> Vec<VtLine> {
    let mut out = Vec::new();
    for line in lines {
        clip_line(line, &mut out, k1, k2, axis, is_polygon, false);
    }
    out
}

/// Intersection of segment `a`-`b` with the boundary at `k`, plus its parameter.
fn intersect(ax: f64, ay: f64, bx: f64, by: f64, k: f64, axis: usize) -> (f64, f64, f64) {
    if axis == 0 {
        let t = (k - ax) / (bx - ax);
        (k, ay + (by - ay) * t, t)
    } else {
        let t = (k - ay) / (by - ay);
        (ax + (bx - ax) * t, k, t)
    }
}

#[allow(clippy::too_many_arguments)]
fn clip_line(
    line: &VtLine,
    out: &mut Vec<VtLine>,
    k1: f64,
    k2: f64,
    axis: usize,
    is_polygon: bool,
    track_metrics: bool,
) {
    let geom = &line.coords;
    if geom.is_empty() {
        return;
    }

    let mut slice = line.empty_slice();
    let mut len = line.start;
    let mut seg_len = 0.0;
    let mut t = 0.0;

    let mut i = 0;
    while i + STRIDE < geom.len() {
        let (ax, ay, az) = (geom[i], geom[i + 1], geom[i + 2]);
        let (bx, by) = (geom[i + 3], geom[i + 4]);
        let a = if axis == 0 { ax } else { ay };
        let b = if axis == 0 { bx } else { by };
        let mut exited = false;

        if track_metrics {
            seg_len = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
        }

        if a < k1 {
            // Enters from the low side.
            if b > k1 {
                let (x, y, param) = intersect(ax, ay, bx, by, k1, axis);
                slice.push(x, y, 1.0);
                t = param;
                if track_metrics {
                    slice.start = len + seg_len * t;
                }
            }
        } else if a > k2 {
            // Enters from the high side.
            if b < k2 {
                let (x, y, param) = intersect(ax, ay, bx, by, k2, axis);
                slice.push(x, y, 1.0);
                t = param;
                if track_metrics {
                    slice.start = len + seg_len * t;
                }
            }
        } else {
            slice.push(ax, ay, az);
        }

        if b < k1 && a >= k1 {
            // Exits on the low side.
            let (x, y, param) = intersect(ax, ay, bx, by, k1, axis);
            slice.push(x, y, 1.0);
            t = param;
            exited = true;
        }
        if b > k2 && a <= k2 {
            // Exits on the high side.
            let (x, y, param) = intersect(ax, ay, bx, by, k2, axis);
            slice.push(x, y, 1.0);
            t = param;
            exited = true;
        }

        if !is_polygon && exited {
            if track_metrics {
                slice.end = len + seg_len * t;
            }
            out.push(std::mem::replace(&mut slice, line.empty_slice()));
        }

        if track_metrics {
            len += seg_len;
        }
        i += STRIDE;
    }

    let last = geom.len() - STRIDE;
    let (ax, ay, az) = (geom[last], geom[last + 1], geom[last + 2]);
    let a = if axis == 0 { ax } else { ay };
    if a >= k1 && a <= k2 {
        slice.push(ax, ay, az);
    }

    // Re-close rings left open by clipping.
    if is_polygon && slice.coords.len() >= 2 * STRIDE {
        let last = slice.coords.len() - STRIDE;
        let (x0, y0, z0) = (slice.coords[0], slice.coords[1], slice.coords[2]);
        if slice.coords[last] != x0 || slice.coords[last + 1] != y0 {
            slice.push(x0, y0, z0);
        }
    }

    if !slice.is_empty() {
        out.push(slice);
    }
}

/// Copies features across the antimeridian so tiles at the date line see
/// geometry from both sides. `buffer` is in unit-square units.
pub fn wrap(features: Vec<Arc<VtFeature>>, buffer: f64, line_metrics: bool) -> Vec<Arc<VtFeature>> {
    let left = clip(&features, 1.0, -1.0 - buffer, buffer, 0, -1.0, 2.0, line_metrics);
    let right = clip(&features, 1.0, 1.0 - buffer, 2.0 + buffer, 0, -1.0, 2.0, line_metrics);

    if left.is_none() && right.is_none() {
        return features;
    }

    let center =
        clip(&features, 1.0, -buffer, 1.0 + buffer, 0, -1.0, 2.0, line_metrics).unwrap_or_default();
    let mut merged = Vec::with_capacity(center.len());
    if let Some(left) = left {
        merged.extend(shift_features(&left, 1.0));
    }
    merged.extend(center);
    if let Some(right) = right {
        merged.extend(shift_features(&right, -1.0));
    }
    merged
}

fn shift_features(features: &[Arc<VtFeature>], offset: f64) -> Vec<Arc<VtFeature>> {
    features
        .iter()
        .map(|feature| {
            let geometry = feature.geometry.map_buffers(|coords| {
                let mut shifted = coords.to_vec();
                for vertex in shifted.chunks_exact_mut(STRIDE) {
                    vertex[0] += offset;
                }
                shifted
            });
            derive(feature, geometry)
        })
        .collect()
}
