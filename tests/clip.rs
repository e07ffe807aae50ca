use std::sync::Arc;

use geojson::{Feature, Geometry, Value as GeoValue};

use vt_tiler::input::feature_from_geometry;
use vt_tiler::options::TilerOptions;
use vt_tiler::tiler::{Bbox, STRIDE, VtFeature, VtGeometry, clip, convert, wrap};

fn prepared(features: &[Feature]) -> Vec<Arc<VtFeature>> {
    convert(features, &TilerOptions::default()).expect("convert")
}

fn bounds(features: &[Arc<VtFeature>]) -> Bbox {
    let mut bbox = Bbox::EMPTY;
    for feature in features {
        bbox.merge(&feature.bbox);
    }
    bbox
}

fn point_count(features: &[Arc<VtFeature>]) -> usize {
    features
        .iter()
        .map(|feature| match &feature.geometry {
            VtGeometry::Point(coords) | VtGeometry::MultiPoint(coords) => coords.len() / STRIDE,
            other => panic!("unexpected geometry {other:?}"),
        })
        .sum()
}

#[test]
fn windows_partition_points_without_loss() {
    let mut features = Vec::new();
    for i in 0..40 {
        let lng = -170.0 + i as f64 * 8.3;
        let lat = -60.0 + (i * 37 % 120) as f64;
        features.push(feature_from_geometry(Geometry::new(GeoValue::Point(vec![
            lng, lat,
        ]))));
    }
    // Exactly on window boundaries.
    for lng in [-90.0, 0.0, 90.0] {
        features.push(feature_from_geometry(Geometry::new(GeoValue::Point(vec![
            lng, 5.0,
        ]))));
    }
    let prepared = prepared(&features);
    let bbox = bounds(&prepared);

    let mut total = 0;
    for window in 0..4 {
        let k1 = window as f64 * 0.25;
        let k2 = k1 + 0.25;
        if let Some(clipped) = clip(&prepared, 1.0, k1, k2, 0, bbox.min_x, bbox.max_x, false) {
            for feature in clipped.iter() {
                assert!(feature.bbox.min_x >= k1 && feature.bbox.max_x <= k2);
            }
            total += point_count(&clipped);
        }
    }
    assert_eq!(total, features.len());
}

#[test]
fn multipoint_keeps_only_points_inside() {
    let multipoint = Geometry::new(GeoValue::MultiPoint(vec![
        vec![-100.0, 0.0],
        vec![-10.0, 0.0],
        vec![100.0, 0.0],
    ]));
    let prepared = prepared(&[feature_from_geometry(multipoint)]);
    let bbox = bounds(&prepared);

    let west = clip(&prepared, 1.0, 0.0, 0.5, 0, bbox.min_x, bbox.max_x, false).expect("west");
    assert_eq!(point_count(&west), 2);
    let east = clip(&prepared, 1.0, 0.5, 1.0, 0, bbox.min_x, bbox.max_x, false).expect("east");
    assert_eq!(point_count(&east), 1);
    assert!(matches!(east[0].geometry, VtGeometry::Point(_)));
}

#[test]
fn window_outside_the_data_yields_nothing() {
    let prepared = prepared(&[feature_from_geometry(Geometry::new(GeoValue::Point(vec![
        -120.0, 10.0,
    ])))]);
    let bbox = bounds(&prepared);
    assert!(clip(&prepared, 1.0, 0.5, 1.0, 0, bbox.min_x, bbox.max_x, false).is_none());
}

#[test]
fn line_pieces_meet_at_the_boundary() {
    let line = Geometry::new(GeoValue::LineString(vec![
        vec![-100.0, 10.0],
        vec![100.0, 10.0],
    ]));
    let prepared = prepared(&[feature_from_geometry(line)]);
    let bbox = bounds(&prepared);

    let west = clip(&prepared, 1.0, 0.0, 0.5, 0, bbox.min_x, bbox.max_x, false).expect("west");
    let east = clip(&prepared, 1.0, 0.5, 1.0, 0, bbox.min_x, bbox.max_x, false).expect("east");

    let VtGeometry::LineString(west) = &west[0].geometry else {
        panic!("west piece is not a line");
    };
    let VtGeometry::LineString(east) = &east[0].geometry else {
        panic!("east piece is not a line");
    };
    let west_end = west.coords[west.coords.len() - STRIDE];
    let east_start = east.coords[0];
    assert!((west_end - 0.5).abs() < 1e-12);
    assert!((east_start - 0.5).abs() < 1e-12);
    assert!((west.coords[1] - east.coords[1]).abs() < 1e-12);
}

#[test]
fn clipped_polygon_rings_stay_closed() {
    let square = Geometry::new(GeoValue::Polygon(vec![vec![
        vec![-20.0, -20.0],
        vec![20.0, -20.0],
        vec![20.0, 20.0],
        vec![-20.0, 20.0],
        vec![-20.0, -20.0],
    ]]));
    let prepared = prepared(&[feature_from_geometry(square)]);
    let bbox = bounds(&prepared);

    let west = clip(&prepared, 1.0, 0.0, 0.5, 0, bbox.min_x, bbox.max_x, false).expect("west");
    let VtGeometry::Polygon(rings) = &west[0].geometry else {
        panic!("clipped geometry is not a polygon");
    };
    let ring = &rings[0].coords;
    let last = ring.len() - STRIDE;
    assert_eq!(ring[0], ring[last]);
    assert_eq!(ring[1], ring[last + 1]);
    assert!(
        ring.chunks_exact(STRIDE)
            .all(|vertex| vertex[0] <= 0.5 + 1e-12)
    );
}

#[test]
fn antimeridian_crossing_gets_a_world_copy() {
    let line = Geometry::new(GeoValue::LineString(vec![
        vec![170.0, 10.0],
        vec![190.0, 10.0],
    ]));
    let prepared = prepared(&[feature_from_geometry(line)]);
    let buffer = 64.0 / 4096.0;
    let wrapped = wrap(prepared, buffer, false);

    assert_eq!(wrapped.len(), 2);
    let center = &wrapped[0].bbox;
    assert!(center.min_x > 0.9 && center.max_x <= 1.0 + buffer + 1e-12);
    let copy = &wrapped[1].bbox;
    assert!(copy.min_x >= -buffer - 1e-12 && copy.max_x < 0.1);
    assert!((copy.max_x - (190.0 / 360.0 - 0.5)).abs() < 1e-12);
}

#[test]
fn data_inside_the_world_is_not_copied() {
    let line = Geometry::new(GeoValue::LineString(vec![
        vec![-20.0, 10.0],
        vec![20.0, 10.0],
    ]));
    let prepared = prepared(&[feature_from_geometry(line)]);
    let wrapped = wrap(prepared.clone(), 64.0 / 4096.0, false);
    assert_eq!(wrapped.len(), 1);
    assert!(std::sync::Arc::ptr_eq(&wrapped[0], &prepared[0]));
}
