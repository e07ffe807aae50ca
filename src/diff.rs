use std::collections::{HashMap, HashSet};
use std::fmt;

use geojson::feature::Id;
use geojson::{Feature, GeoJson, Geometry};
use serde::Deserialize;
use serde_json::Value;

use crate::input::{feature_id, id_from_value};

/// Key of a feature in an updateable source: the id in its string form, so
/// `1` and `"1"` address the same feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey(String);

impl FeatureKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn from_id(id: &Id) -> Self {
        match id {
            Id::Number(number) => match number.as_f64() {
                Some(value)
                    if number.is_f64()
                    && value.fract() == 0.0
                    && value.abs() < 9_007_199_254_740_992.0 =>
                {
                    Self(format!("{}", value as i64))
                }
                _ => Self(number.to_string()),
            },
            Id::String(text) => Self(text.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        id_from_value(value).as_ref().map(Self::from_id)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyUpdate {
    pub key: String,
    pub value: Value,
}

/// Changes to apply to one existing feature.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonFeatureDiff {
    pub id: Value,
    #[serde(default)]
    pub new_geometry: Option<Geometry>,
    #[serde(default)]
    pub remove_all_properties: bool,
    #[serde(default)]
    pub remove_properties: Vec<String>,
    #[serde(default)]
    pub add_or_update_properties: Vec<PropertyUpdate>,
}

/// An incremental update to a previously loaded source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoJsonSourceDiff {
    pub remove_all: bool,
    #[serde(alias = "remove")]
    pub removed: Vec<Value>,
    pub add: Vec<Feature>,
    pub update: Vec<GeoJsonFeatureDiff>,
}

/// Whether every feature of `geojson` has a unique id.
pub fn is_updateable(geojson: &GeoJson, promote_id: Option<&str>) -> bool {
    match geojson {
        GeoJson::Feature(feature) => feature_id(feature, promote_id).is_some(),
        GeoJson::FeatureCollection(collection) => {
            let mut seen = HashSet::new();
            collection.features.iter().all(|feature| {
                feature_id(feature, promote_id)
                    .map(|id| seen.insert(FeatureKey::from_id(&id)))
                    .unwrap_or(false)
            })
        }
        GeoJson::Geometry(_) => false,
    }
}

/// Features keyed by id, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct UpdateableData {
    order: Vec<FeatureKey>,
    features: HashMap<FeatureKey, Feature>,
}

impl UpdateableData {
    /// Indexes `geojson` by id, or returns `None` when it is not updateable.
    pub fn from_geojson(geojson: &GeoJson, promote_id: Option<&str>) -> Option<Self> {
        if !is_updateable(geojson, promote_id) {
            return None;
        }
        let mut data = Self::default();
        match geojson {
            GeoJson::Feature(feature) => data.insert(feature.clone(), promote_id),
            GeoJson::FeatureCollection(collection) => {
                for feature in &collection.features {
                    data.insert(feature.clone(), promote_id);
                }
            }
            GeoJson::Geometry(_) => return None,
        }
        Some(data)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, key: &FeatureKey) -> Option<&Feature> {
        self.features.get(key)
    }

    /// Current features in insertion order.
    pub fn features(&self) -> Vec<Feature> {
        self.order
            .iter()
            .filter_map(|key| self.features.get(key).cloned())
            .collect()
    }

    fn insert(&mut self, feature: Feature, promote_id: Option<&str>) {
        let Some(id) = feature_id(&feature, promote_id) else {
            return;
        };
        let key = FeatureKey::from_id(&id);
        if self.features.insert(key.clone(), feature).is_none() {
            self.order.push(key);
        }
    }

    /// Applies `diff`: clear, then removals, then additions, then updates.
    pub fn apply(&mut self, diff: &GeoJsonSourceDiff, promote_id: Option<&str>) {
        if diff.remove_all {
            self.features.clear();
            self.order.clear();
        }

        if !diff.removed.is_empty() {
            for key in diff.removed.iter().filter_map(FeatureKey::from_value) {
                self.features.remove(&key);
            }
            let features = &self.features;
            self.order.retain(|key| features.contains_key(key));
        }

        for feature in &diff.add {
            self.insert(feature.clone(), promote_id);
        }

        for update in &diff.update {
            let Some(key) = FeatureKey::from_value(&update.id) else {
                continue;
            };
            let Some(feature) = self.features.get_mut(&key) else {
                continue;
            };
            if let Some(geometry) = &update.new_geometry {
                feature.geometry = Some(geometry.clone());
            }
            if update.remove_all_properties {
                feature.properties = Some(Default::default());
            } else if !update.remove_properties.is_empty() {
                if let Some(properties) = feature.properties.as_mut() {
                    for name in &update.remove_properties {
                        properties.remove(name);
                    }
                }
            }
            if !update.add_or_update_properties.is_empty() {
                let properties = feature.properties.get_or_insert_with(Default::default);
                for PropertyUpdate { key, value } in &update.add_or_update_properties {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
