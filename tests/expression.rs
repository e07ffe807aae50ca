use geojson::JsonObject;
use serde_json::{Value, json};

use vt_tiler::expression::{ClusterProperties, EvalContext, FeatureFilter};

fn props(value: Value) -> JsonObject {
    value.as_object().cloned().expect("object")
}

fn matches(filter: Value, properties: Value, geometry_type: &str) -> bool {
    let filter = FeatureFilter::compile(&filter).expect("filter");
    let properties = props(properties);
    filter.matches(&EvalContext::new(&properties, geometry_type))
}

#[test]
fn legacy_comparisons_read_properties() {
    let place = json!({"class": "park", "rank": 3});
    assert!(matches(json!(["==", "class", "park"]), place.clone(), "Point"));
    assert!(matches(json!(["!=", "class", "road"]), place.clone(), "Point"));
    assert!(matches(json!([">=", "rank", 3]), place.clone(), "Point"));
    assert!(!matches(json!(["<", "rank", 3]), place.clone(), "Point"));
    assert!(!matches(json!([">", "missing", 1]), place, "Point"));
}

#[test]
fn legacy_set_and_presence_filters() {
    let place = json!({"class": "park"});
    assert!(matches(json!(["in", "class", "park", "garden"]), place.clone(), "Point"));
    assert!(matches(json!(["!in", "class", "road"]), place.clone(), "Point"));
    assert!(matches(json!(["has", "class"]), place.clone(), "Point"));
    assert!(matches(json!(["!has", "name"]), place.clone(), "Point"));
    assert!(matches(json!(["==", "$type", "Polygon"]), place, "Polygon"));
}

#[test]
fn combinators_nest() {
    let filter = json!([
        "all",
        ["==", "class", "park"],
        ["any", ["==", "rank", 1], ["==", "rank", 2]],
        ["none", ["has", "closed"]],
    ]);
    assert!(matches(filter.clone(), json!({"class": "park", "rank": 2}), "Point"));
    assert!(!matches(filter.clone(), json!({"class": "park", "rank": 3}), "Point"));
    assert!(!matches(filter, json!({"class": "park", "rank": 1, "closed": true}), "Point"));
    assert!(matches(json!(["!", ["==", "class", "road"]]), json!({"class": "park"}), "Point"));
}

#[test]
fn expression_syntax_is_understood() {
    let place = json!({"name": "Main", "height": 12, "levels": "4"});
    assert!(matches(json!(["==", ["get", "name"], "Main"]), place.clone(), "Point"));
    assert!(matches(json!([">", ["*", ["get", "height"], 2], 20]), place.clone(), "Point"));
    assert!(matches(json!(["==", ["to-number", ["get", "levels"]], 4]), place.clone(), "Point"));
    assert!(matches(
        json!(["==", ["geometry-type"], "LineString"]),
        place.clone(),
        "LineString"
    ));
    assert!(matches(
        json!(["in", ["get", "name"], ["literal", ["Main", "High"]]]),
        place.clone(),
        "Point"
    ));
    assert!(matches(
        json!(["==", ["match", ["get", "name"], ["Main", "High"], "big", "small"], "big"]),
        place.clone(),
        "Point"
    ));
    assert!(matches(
        json!(["==", ["case", [">", ["get", "height"], 100], "tall", "short"], "short"]),
        place.clone(),
        "Point"
    ));
    assert!(matches(
        json!(["==", ["coalesce", ["get", "missing"], ["get", "name"]], "Main"]),
        place.clone(),
        "Point"
    ));
    assert!(matches(
        json!(["==", ["concat", ["get", "name"], "-", ["get", "height"]], "Main-12"]),
        place,
        "Point"
    ));
}

#[test]
fn literal_booleans_are_filters() {
    assert!(matches(json!(true), json!({}), "Point"));
    assert!(!matches(json!(false), json!({}), "Point"));
}

#[test]
fn malformed_filters_are_rejected() {
    for filter in [json!("class"), json!(["nope", 1]), json!(["==", "a"]), json!(42)] {
        let err = FeatureFilter::compile(&filter).expect_err("malformed filter");
        assert!(err.is_invalid_input(), "{filter}");
    }
}

#[test]
fn cluster_properties_map_and_reduce() {
    let aggregates = ClusterProperties::compile(&json!({
        "total": ["+", ["get", "count"]],
        "names": [["concat", ["accumulated"], ",", ["get", "names"]], ["get", "name"]],
    }))
    .expect("compile");
    assert!(!aggregates.is_empty());

    let mut accumulated = aggregates.map(&props(json!({"count": 2, "name": "a"})));
    assert_eq!(accumulated["total"], json!(2));
    let other = aggregates.map(&props(json!({"count": 5, "name": "b"})));
    aggregates.reduce(&mut accumulated, &other);

    assert_eq!(accumulated["total"], json!(7));
    assert_eq!(accumulated["names"], json!("a,b"));
}

#[test]
fn malformed_cluster_properties_are_rejected() {
    assert!(ClusterProperties::compile(&json!([1, 2])).is_err());
    assert!(ClusterProperties::compile(&json!({"sum": ["+"]})).is_err());
    assert!(ClusterProperties::compile(&json!({})).expect("empty").is_empty());
}
