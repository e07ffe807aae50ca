use serde::Deserialize;
use serde_json::Value;

use crate::diff::GeoJsonSourceDiff;
use crate::error::{Result, TilerError};

/// Highest zoom a tile pyramid may be built for.
pub const MAX_SUPPORTED_ZOOM: u8 = 24;

/// Options controlling the quad-tree tiler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilerOptions {
    /// Deepest zoom level detail is preserved for.
    pub max_zoom: u8,
    /// Deepest zoom of the eager first pass.
    pub index_max_zoom: u8,
    /// Tiles holding fewer points than this are not split in the first pass.
    pub index_max_points: u32,
    /// Simplification tolerance in extent units (higher means simpler).
    pub tolerance: f64,
    /// Tile coordinate extent.
    pub extent: u32,
    /// Clip buffer on each side of a tile, in extent units.
    pub buffer: u32,
    /// Track the arc-length fraction of each clipped line piece.
    pub line_metrics: bool,
    /// Use this property as the feature id.
    pub promote_id: Option<String>,
    /// Use the input index as the feature id.
    pub generate_id: bool,
}

impl Default for TilerOptions {
    fn default() -> Self {
        Self {
            max_zoom: 14,
            index_max_zoom: 5,
            index_max_points: 100_000,
            tolerance: 3.0,
            extent: 4096,
            buffer: 64,
            line_metrics: false,
            promote_id: None,
            generate_id: false,
        }
    }
}

impl TilerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(TilerError::invalid("maxZoom should be in the 0-24 range"));
        }
        if self.index_max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(TilerError::invalid("indexMaxZoom should be in the 0-24 range"));
        }
        if self.promote_id.is_some() && self.generate_id {
            return Err(TilerError::invalid(
                "promoteId and generateId cannot be used together.",
            ));
        }
        if self.extent == 0 {
            return Err(TilerError::invalid("extent must be greater than zero"));
        }
        Ok(())
    }
}

/// Options controlling point clustering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterOptions {
    /// Lowest zoom clusters are generated on.
    pub min_zoom: u8,
    /// Highest zoom clusters are generated on.
    pub max_zoom: u8,
    /// Minimum number of points that form a cluster.
    pub min_points: u32,
    /// Cluster radius in pixels.
    pub radius: f64,
    /// Tile extent; `radius` is relative to it.
    pub extent: f64,
    /// KD-tree leaf block size.
    pub node_size: usize,
    /// Use the input index as the feature id of unclustered points.
    pub generate_id: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 16,
            min_points: 2,
            radius: 40.0,
            extent: 512.0,
            node_size: 64,
            generate_id: false,
        }
    }
}

impl ClusterOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(TilerError::invalid("maxZoom should be in the 0-24 range"));
        }
        if self.min_zoom > self.max_zoom {
            return Err(TilerError::invalid("minZoom must not exceed maxZoom"));
        }
        if self.extent <= 0.0 || self.radius < 0.0 {
            return Err(TilerError::invalid(
                "cluster extent must be positive and radius non-negative",
            ));
        }
        if self.node_size == 0 {
            return Err(TilerError::invalid("nodeSize must be greater than zero"));
        }
        Ok(())
    }
}

/// A "replace data" request from the foreground.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadDataParams {
    /// Source identifier, used in error messages.
    pub source: String,
    /// Literal GeoJSON, either as JSON text or as an already parsed object.
    pub data: Option<Value>,
    /// Incremental update applied to the previously loaded data.
    pub data_diff: Option<GeoJsonSourceDiff>,
    pub cluster: bool,
    pub supercluster_options: ClusterOptions,
    pub geojson_vt_options: TilerOptions,
    /// `{name: [operator, mapExpression]}` aggregations for clusters.
    pub cluster_properties: Option<Value>,
    /// Boolean expression evaluated per top-level feature.
    pub filter: Option<Value>,
    pub promote_id: Option<String>,
}

impl LoadDataParams {
    /// Tiler options with the request-level `promoteId` folded in.
    pub fn tiler_options(&self) -> TilerOptions {
        let mut options = self.geojson_vt_options.clone();
        if options.promote_id.is_none() {
            options.promote_id = self.promote_id.clone();
        }
        options
    }

    pub fn promote_id(&self) -> Option<&str> {
        self.promote_id
            .as_deref()
            .or(self.geojson_vt_options.promote_id.as_deref())
    }
}
