use std::sync::Arc;

use geojson::JsonObject;
use geojson::feature::Id;
use mvt_reader::Reader;
use serde_json::json;

use vt_tiler::encode::{
    GEOJSON_TILE_LAYER_NAME, TILE_LAYER_VERSION, TagValue, decode_tile, encode_mirror,
    encode_tile, summarize_tile, tags_to_json, wire_id,
};
use vt_tiler::tiler::{TileFeature, TileGeomType, TileGeometry};

fn tags(value: serde_json::Value) -> Arc<JsonObject> {
    Arc::new(value.as_object().cloned().expect("object"))
}

fn point_feature(id: Option<Id>, x: i32, y: i32, properties: serde_json::Value) -> TileFeature {
    TileFeature {
        id,
        kind: TileGeomType::Point,
        geometry: TileGeometry::Local(vec![vec![[x, y]]]),
        tags: tags(properties),
    }
}

fn line_feature() -> TileFeature {
    TileFeature {
        id: None,
        kind: TileGeomType::LineString,
        geometry: TileGeometry::Local(vec![
            vec![[0, 0], [100, 100], [200, 50]],
            vec![[300, 300], [400, 300]],
        ]),
        tags: tags(json!({"highway": "primary"})),
    }
}

fn square_feature() -> TileFeature {
    TileFeature {
        id: Some(Id::Number(9.into())),
        kind: TileGeomType::Polygon,
        geometry: TileGeometry::Local(vec![vec![
            [10, 10],
            [110, 10],
            [110, 110],
            [10, 110],
            [10, 10],
        ]]),
        tags: tags(json!({"landuse": "park"})),
    }
}

#[test]
fn tile_has_a_single_named_layer() {
    let features = vec![point_feature(None, 10, 20, json!({}))];
    let result = encode_tile(&features, 4096).expect("encode");

    let layer = result
        .vector_tile
        .layers
        .get(GEOJSON_TILE_LAYER_NAME)
        .expect("geojson layer");
    assert_eq!(result.vector_tile.layers.len(), 1);
    assert_eq!(layer.extent, 4096);
    assert_eq!(layer.version, TILE_LAYER_VERSION);
    assert_eq!(layer.features[0].geometry, vec![vec![[10, 20]]]);

    let reader = Reader::new(result.raw_data.clone()).expect("reader");
    let layers = reader.get_layer_metadata().expect("layer metadata");
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].name, GEOJSON_TILE_LAYER_NAME);
    let decoded = reader.get_features(0).expect("features");
    assert_eq!(decoded.len(), 1);
}

#[test]
fn property_values_keep_their_wire_types() {
    let features = vec![point_feature(
        None,
        1,
        2,
        json!({
            "name": "cafe",
            "open": true,
            "floors": 3,
            "depth": -4,
            "rating": 4.5,
            "tags": ["a", "b"],
            "missing": null,
        }),
    )];
    let result = encode_tile(&features, 4096).expect("encode");
    let properties = &result.vector_tile.layers[GEOJSON_TILE_LAYER_NAME].features[0].properties;

    assert_eq!(properties["name"], TagValue::Str("cafe".to_string()));
    assert_eq!(properties["open"], TagValue::Bool(true));
    assert_eq!(properties["floors"], TagValue::UInt(3));
    assert_eq!(properties["depth"], TagValue::SInt(-4));
    assert_eq!(properties["rating"], TagValue::Double(4.5));
    assert_eq!(properties["tags"], TagValue::Str("[\"a\",\"b\"]".to_string()));
    assert!(!properties.contains_key("missing"));

    let decoded = decode_tile(&result.raw_data).expect("decode");
    assert_eq!(
        decoded.layers[GEOJSON_TILE_LAYER_NAME].features[0].properties,
        *properties
    );
    assert_eq!(tags_to_json(properties)["floors"], json!(3));
}

#[test]
fn only_unsigned_ids_reach_the_wire() {
    assert_eq!(wire_id(&Id::Number(7.into())), Some(7));
    assert_eq!(wire_id(&Id::Number((-1).into())), None);
    assert_eq!(wire_id(&Id::String("12".to_string())), Some(12));
    assert_eq!(wire_id(&Id::String("abc".to_string())), None);

    let features = vec![
        point_feature(Some(Id::Number(7.into())), 0, 0, json!({})),
        point_feature(Some(Id::String("abc".to_string())), 1, 1, json!({})),
    ];
    let result = encode_tile(&features, 4096).expect("encode");
    let decoded = decode_tile(&result.raw_data).expect("decode");
    let ids: Vec<Option<u64>> = decoded.layers[GEOJSON_TILE_LAYER_NAME]
        .features
        .iter()
        .map(|feature| feature.id)
        .collect();
    assert_eq!(ids, vec![Some(7), None]);
}

#[test]
fn reencoding_a_decoded_tile_is_stable() {
    let features = vec![
        point_feature(Some(Id::Number(1.into())), 5, 6, json!({"kind": "a", "rank": 2})),
        line_feature(),
    ];
    let first = encode_tile(&features, 4096).expect("encode");
    let decoded = decode_tile(&first.raw_data).expect("decode");
    assert_eq!(decoded, first.vector_tile);

    let second = encode_mirror(&decoded).expect("re-encode");
    assert_eq!(second, first.raw_data);
}

#[test]
fn closed_polygon_rings_are_written_open() {
    let result = encode_tile(&[square_feature()], 4096).expect("encode");
    let feature = &result.vector_tile.layers[GEOJSON_TILE_LAYER_NAME].features[0];
    assert_eq!(feature.kind, 3);
    assert_eq!(feature.geometry[0].len(), 4);
    assert_eq!(feature.id, Some(9));
}

#[test]
fn degenerate_geometries_are_dropped() {
    let short_line = TileFeature {
        id: None,
        kind: TileGeomType::LineString,
        geometry: TileGeometry::Local(vec![vec![[0, 0]]]),
        tags: tags(json!({})),
    };
    let result = encode_tile(&[short_line, line_feature()], 4096).expect("encode");
    assert_eq!(
        result.vector_tile.layers[GEOJSON_TILE_LAYER_NAME].features.len(),
        1
    );
}

#[test]
fn summary_counts_features_by_kind() {
    let features = vec![
        point_feature(None, 1, 1, json!({"name": "a"})),
        point_feature(None, 2, 2, json!({"rank": 1})),
        line_feature(),
        square_feature(),
    ];
    let result = encode_tile(&features, 512).expect("encode");
    let summary = summarize_tile(&result.raw_data).expect("summary");

    assert_eq!(summary.bytes, result.raw_data.len());
    assert_eq!(summary.layers.len(), 1);
    let layer = &summary.layers[0];
    assert_eq!(layer.name, GEOJSON_TILE_LAYER_NAME);
    assert_eq!(layer.extent, 512);
    assert_eq!(layer.feature_count, 4);
    assert_eq!(layer.points, 2);
    assert_eq!(layer.lines, 1);
    assert_eq!(layer.polygons, 1);
    assert_eq!(
        layer.keys.iter().cloned().collect::<Vec<_>>(),
        vec!["highway", "landuse", "name", "rank"]
    );
}

#[test]
fn mirror_keeps_only_the_vertices_written_to_the_wire() {
    let polygon = TileFeature {
        id: None,
        kind: TileGeomType::Polygon,
        geometry: TileGeometry::Local(vec![vec![
            [10, 10],
            [60, 10],
            [110, 10],
            [110, 110],
            [110, 110],
            [10, 110],
            [10, 10],
        ]]),
        tags: tags(json!({})),
    };
    let line = TileFeature {
        id: None,
        kind: TileGeomType::LineString,
        geometry: TileGeometry::Local(vec![vec![[0, 0], [50, 50], [50, 50], [100, 0]]]),
        tags: tags(json!({})),
    };
    let result = encode_tile(&[polygon, line], 4096).expect("encode");

    let features = &result.vector_tile.layers[GEOJSON_TILE_LAYER_NAME].features;
    assert_eq!(
        features[0].geometry,
        vec![vec![[10, 10], [110, 10], [110, 110], [10, 110]]]
    );
    assert_eq!(features[1].geometry, vec![vec![[0, 0], [50, 50], [100, 0]]]);

    let decoded = decode_tile(&result.raw_data).expect("decode");
    assert_eq!(decoded, result.vector_tile);
}
