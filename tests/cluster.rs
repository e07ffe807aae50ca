use geojson::{Feature, Geometry, Value as GeoValue};
use serde_json::{Value, json};

use vt_tiler::TilerError;
use vt_tiler::cluster::{DEFAULT_LEAVES_LIMIT, Supercluster, abbreviate_count};
use vt_tiler::expression::ClusterProperties;
use vt_tiler::options::ClusterOptions;

const WORLD: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

fn places(count: usize) -> Vec<Feature> {
    (0..count)
        .map(|i| {
            let lng = -10.0 + (i * 37 % 200) as f64 * 0.1;
            let lat = 40.0 + (i * 53 % 100) as f64 * 0.1;
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(GeoValue::Point(vec![lng, lat]))),
                id: None,
                properties: json!({"index": i, "value": 1}).as_object().cloned(),
                foreign_members: None,
            }
        })
        .collect()
}

fn options() -> ClusterOptions {
    ClusterOptions {
        max_zoom: 10,
        ..ClusterOptions::default()
    }
}

fn point_count(feature: &Feature) -> u64 {
    feature
        .property("point_count")
        .and_then(Value::as_u64)
        .unwrap_or(1)
}

fn is_cluster(feature: &Feature) -> bool {
    feature.property("cluster").and_then(Value::as_bool) == Some(true)
}

fn cluster_id(feature: &Feature) -> u64 {
    feature
        .property("cluster_id")
        .and_then(Value::as_u64)
        .expect("cluster_id")
}

fn biggest_cluster(index: &Supercluster, zoom: u8) -> Feature {
    index
        .get_clusters(WORLD, zoom)
        .into_iter()
        .filter(is_cluster)
        .max_by_key(point_count)
        .expect("a cluster")
}

#[test]
fn every_zoom_accounts_for_every_point() {
    let points = places(300);
    let index = Supercluster::load(points.clone(), options(), None).expect("load");

    for zoom in 0..=11u8 {
        let total: u64 = index.get_clusters(WORLD, zoom).iter().map(point_count).sum();
        assert_eq!(total, points.len() as u64, "zoom {zoom}");
    }
}

#[test]
fn beyond_max_zoom_points_come_back_unclustered() {
    let points = places(50);
    let index = Supercluster::load(points.clone(), options(), None).expect("load");
    let features = index.get_clusters(WORLD, 11);
    assert_eq!(features.len(), points.len());
    assert!(features.iter().all(|feature| !is_cluster(feature)));
}

#[test]
fn cluster_features_carry_summary_properties() {
    let index = Supercluster::load(places(300), options(), None).expect("load");
    let cluster = biggest_cluster(&index, 0);

    let id = cluster_id(&cluster);
    assert_eq!(
        cluster.id,
        Some(geojson::feature::Id::Number(id.into()))
    );
    assert_eq!(
        cluster.property("point_count_abbreviated"),
        Some(&abbreviate_count(point_count(&cluster)))
    );
}

#[test]
fn children_sum_to_the_parent() {
    let index = Supercluster::load(places(300), options(), None).expect("load");
    let cluster = biggest_cluster(&index, 2);

    let children = index.get_children(cluster_id(&cluster)).expect("children");
    assert!(!children.is_empty());
    let total: u64 = children.iter().map(point_count).sum();
    assert_eq!(total, point_count(&cluster));
}

#[test]
fn leaves_paginate_over_input_features() {
    let index = Supercluster::load(places(300), options(), None).expect("load");
    let cluster = biggest_cluster(&index, 0);
    let id = cluster_id(&cluster);
    let count = point_count(&cluster) as usize;
    assert!(count >= 10);

    let all = index.get_leaves(id, usize::MAX, 0).expect("all leaves");
    assert_eq!(all.len(), count);
    assert!(all.iter().all(|leaf| leaf.property("index").is_some()));

    let first = index.get_leaves(id, 5, 0).expect("first page");
    let second = index.get_leaves(id, 5, 5).expect("second page");
    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    assert_eq!(first[..], all[..5]);
    assert_eq!(second[..], all[5..10]);

    let default_page = index.get_leaves(id, 0, 0).expect("default page");
    assert_eq!(default_page.len(), DEFAULT_LEAVES_LIMIT);
    assert_eq!(default_page[..], all[..DEFAULT_LEAVES_LIMIT]);
}

#[test]
fn expansion_zoom_splits_the_cluster() {
    let index = Supercluster::load(places(300), options(), None).expect("load");
    let cluster = biggest_cluster(&index, 0);
    let id = cluster_id(&cluster);

    let zoom = index.get_cluster_expansion_zoom(id).expect("expansion zoom");
    assert!(zoom >= 1 && zoom <= 11, "zoom {zoom}");
}

#[test]
fn unknown_cluster_ids_are_rejected() {
    let points = places(20);
    let index = Supercluster::load(points, options(), None).expect("load");

    let err = index.get_children(3).expect_err("leaf id");
    assert!(matches!(err, TilerError::UnknownCluster(3)));
    let err = index.get_leaves(1_000_000, 10, 0).expect_err("bogus id");
    assert!(matches!(err, TilerError::UnknownCluster(1_000_000)));
    assert!(index.get_cluster_expansion_zoom(7).is_err());
}

#[test]
fn cluster_properties_are_aggregated() {
    let aggregates = ClusterProperties::compile(&json!({
        "sum": ["+", ["get", "value"]],
        "largest": ["max", ["get", "index"]],
    }))
    .expect("compile");
    let index = Supercluster::load(places(300), options(), Some(aggregates)).expect("load");

    for zoom in [0u8, 3, 6] {
        for feature in index.get_clusters(WORLD, zoom).iter().filter(|f| is_cluster(f)) {
            let sum = feature.property("sum").and_then(Value::as_f64).expect("sum");
            assert_eq!(sum, point_count(feature) as f64);
            assert!(feature.property("largest").and_then(Value::as_u64).is_some());
        }
    }
}

#[test]
fn tile_places_point_in_local_coordinates() {
    let point = Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![0.0, 0.0]))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    let index = Supercluster::load(vec![point], options(), None).expect("load");
    let tile = index.get_tile(0, 0, 0).expect("tile");
    assert_eq!(tile.len(), 1);
    assert_eq!(tile[0].local_rings(), &[vec![[256, 256]]]);
    assert!(index.get_tile(2, 0, 0).is_none());
}

#[test]
fn tiles_on_the_world_edges_wrap_around() {
    let named = |lng: f64, side: &str| Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![lng, 10.0]))),
        id: None,
        properties: json!({"side": side}).as_object().cloned(),
        foreign_members: None,
    };
    let index = Supercluster::load(vec![named(-179.9, "west"), named(179.9, "east")], options(), None)
        .expect("load");

    let x_of = |tile: &[vt_tiler::tiler::TileFeature], side: &str| {
        tile.iter()
            .find(|feature| feature.tags.get("side") == Some(&json!(side)))
            .map(|feature| feature.local_rings()[0][0][0])
    };

    // Last column: the western point reappears past the right edge.
    let last = index.get_tile(1, 1, 0).expect("last column");
    assert_eq!(last.len(), 2);
    assert_eq!(x_of(&last, "west"), Some(512));
    assert!(x_of(&last, "east").is_some_and(|x| (500..=512).contains(&x)));

    // First column: the eastern point reappears at the left edge.
    let first = index.get_tile(1, 0, 0).expect("first column");
    assert_eq!(first.len(), 2);
    assert!(x_of(&first, "east").is_some_and(|x| (-1..=0).contains(&x)));
    assert!(x_of(&first, "west").is_some_and(|x| (0..=12).contains(&x)));
}

#[test]
fn counts_are_abbreviated() {
    assert_eq!(abbreviate_count(999), json!(999));
    assert_eq!(abbreviate_count(1000), json!("1k"));
    assert_eq!(abbreviate_count(1540), json!("1.5k"));
    assert_eq!(abbreviate_count(12_345), json!("12k"));
}

#[test]
fn invalid_options_are_rejected() {
    let bad = ClusterOptions {
        min_zoom: 5,
        max_zoom: 2,
        ..ClusterOptions::default()
    };
    let err = Supercluster::load(places(3), bad, None).expect_err("zoom range");
    assert!(err.is_invalid_input());
}
