use geojson::feature::Id;
use geojson::{Feature, GeoJson, Geometry, JsonObject};
use serde_json::Value;

use crate::error::{Result, TilerError};

/// Parse a literal payload (JSON text or an already decoded object) into GeoJSON.
pub fn parse_geojson(source: &str, data: &Value) -> Result<GeoJson> {
    let invalid = || {
        TilerError::invalid(format!(
            "Input data given to '{source}' is not a valid GeoJSON object."
        ))
    };
    let value = match data {
        Value::String(text) => serde_json::from_str::<Value>(text).map_err(|_| invalid())?,
        Value::Object(_) => data.clone(),
        _ => return Err(invalid()),
    };
    if !value.is_object() {
        return Err(invalid());
    }
    GeoJson::from_json_value(value).map_err(|err| {
        TilerError::invalid(format!(
            "Input data given to '{source}' is not a valid GeoJSON object: {err}"
        ))
    })
}

/// Flatten any GeoJSON document into its top-level features.
pub fn into_features(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![feature_from_geometry(geometry)],
    }
}

pub fn feature_from_geometry(geometry: Geometry) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: None,
        foreign_members: None,
    }
}

/// Collapsed geometry kind used by filters: `Point`, `LineString` or `Polygon`.
pub fn geometry_kind(geometry: Option<&Geometry>) -> &'static str {
    match geometry.map(|geometry| &geometry.value) {
        Some(geojson::Value::Point(_)) | Some(geojson::Value::MultiPoint(_)) => "Point",
        Some(geojson::Value::LineString(_)) | Some(geojson::Value::MultiLineString(_)) => {
            "LineString"
        }
        Some(geojson::Value::Polygon(_)) | Some(geojson::Value::MultiPolygon(_)) => "Polygon",
        _ => "Unknown",
    }
}

/// Interpret a JSON value as a feature id, if it is a string or a number.
pub fn id_from_value(value: &Value) -> Option<Id> {
    match value {
        Value::String(text) => Some(Id::String(text.clone())),
        Value::Number(number) => Some(Id::Number(number.clone())),
        _ => None,
    }
}

/// The id a feature is addressed by: its `promote_id` property when set, its own id otherwise.
pub fn feature_id(feature: &Feature, promote_id: Option<&str>) -> Option<Id> {
    match promote_id {
        Some(key) => feature
            .properties
            .as_ref()
            .and_then(|props| props.get(key))
            .and_then(id_from_value),
        None => feature.id.clone(),
    }
}

pub fn id_to_value(id: &Id) -> Value {
    match id {
        Id::String(text) => Value::String(text.clone()),
        Id::Number(number) => Value::Number(number.clone()),
    }
}

pub fn properties_or_empty(feature: &Feature) -> JsonObject {
    feature.properties.clone().unwrap_or_default()
}
