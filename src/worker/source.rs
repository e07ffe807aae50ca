use std::time::Instant;

use geojson::{Feature, FeatureCollection, GeoJson};
use tracing::{debug, info};

use crate::cluster::Supercluster;
use crate::diff::UpdateableData;
use crate::encode::{GeoJsonTileResult, encode_tile};
use crate::error::{Result, TilerError};
use crate::expression::{ClusterProperties, EvalContext, FeatureFilter};
use crate::input::{geometry_kind, into_features, parse_geojson};
use crate::options::LoadDataParams;
use crate::tiler::{GeoJsonVt, TileCoord};
use crate::worker::coalesce::{CoalesceState, Coalescer, LoadDataCallback, LoadDataOutcome};

/// Summary of a processed "replace data" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDataResult {
    /// Top-level features indexed after filtering.
    pub feature_count: usize,
    pub clustered: bool,
    /// Whether later requests may carry a `dataDiff`.
    pub updateable: bool,
}

/// The index built by the last processed load.
#[derive(Debug)]
pub enum SourceIndex {
    Tiles(GeoJsonVt),
    Clusters(Supercluster),
}

/// Owns one GeoJSON source: its coalescing state, its index and, when the
/// data allows it, an id-keyed copy of the features for incremental updates.
#[derive(Debug)]
pub struct GeoJsonWorkerSource {
    source_id: String,
    coalescer: Coalescer<LoadDataParams, LoadDataResult>,
    index: Option<SourceIndex>,
    updateable: Option<UpdateableData>,
}

impl GeoJsonWorkerSource {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            coalescer: Coalescer::new(),
            index: None,
            updateable: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn state(&self) -> CoalesceState {
        self.coalescer.state()
    }

    pub fn index(&self) -> Option<&SourceIndex> {
        self.index.as_ref()
    }

    pub fn index_mut(&mut self) -> Option<&mut SourceIndex> {
        self.index.as_mut()
    }

    /// Replaces the source data. Runs immediately when idle; otherwise the
    /// request waits for [`coalesce`](Self::coalesce) and replaces any
    /// request already waiting.
    pub fn load_data(&mut self, params: LoadDataParams, callback: LoadDataCallback<LoadDataResult>) {
        if let Some((params, callback)) = self.coalescer.submit(params, callback) {
            self.run(params, callback);
        }
    }

    /// Acknowledges the previous result, starting the waiting request if any.
    pub fn coalesce(&mut self) {
        if let Some((params, callback)) = self.coalescer.ack() {
            self.run(params, callback);
        }
    }

    fn run(&mut self, params: LoadDataParams, callback: LoadDataCallback<LoadDataResult>) {
        let result = self.process(params).map(LoadDataOutcome::Loaded);
        if let Err(err) = &result {
            info!(source = %self.source_id, error = %err, "load failed");
        }
        callback(result);
    }

    fn process(&mut self, params: LoadDataParams) -> Result<LoadDataResult> {
        let started = Instant::now();
        let promote_id = params.promote_id().map(str::to_string);
        let promote_id = promote_id.as_deref();

        let features = match (&params.data_diff, &params.data) {
            (Some(diff), _) => {
                let updateable = self.updateable.as_mut().ok_or_else(|| {
                    TilerError::invalid(format!(
                        "Cannot update existing geojson data in {}",
                        params.source
                    ))
                })?;
                updateable.apply(diff, promote_id);
                updateable.features()
            }
            (None, Some(data)) => {
                let geojson = parse_geojson(&params.source, data)?;
                self.updateable = UpdateableData::from_geojson(&geojson, promote_id);
                into_features(geojson)
            }
            (None, None) => {
                self.updateable = None;
                Vec::new()
            }
        };

        let features = match &params.filter {
            Some(filter) => {
                let filter = FeatureFilter::compile(filter)?;
                features
                    .into_iter()
                    .filter(|feature| {
                        let properties = feature.properties.clone().unwrap_or_default();
                        let kind = geometry_kind(feature.geometry.as_ref());
                        filter.matches(&EvalContext::new(&properties, kind))
                    })
                    .collect()
            }
            None => features,
        };
        let feature_count = features.len();

        let index = if params.cluster {
            let aggregates = match &params.cluster_properties {
                Some(value) => Some(ClusterProperties::compile(value)?),
                None => None,
            };
            SourceIndex::Clusters(Supercluster::load(
                features,
                params.supercluster_options.clone(),
                aggregates,
            )?)
        } else {
            SourceIndex::Tiles(GeoJsonVt::new(&features, params.tiler_options())?)
        };
        self.index = Some(index);

        debug!(
            source = %self.source_id,
            features = feature_count,
            cluster = params.cluster,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded data"
        );
        Ok(LoadDataResult {
            feature_count,
            clustered: params.cluster,
            updateable: self.updateable.is_some(),
        })
    }

    /// Encodes tile `z/x/y`; `None` when there is no data or the tile is empty.
    pub fn load_tile(&mut self, coord: TileCoord) -> Result<Option<GeoJsonTileResult>> {
        let Some(index) = self.index.as_mut() else {
            return Ok(None);
        };
        match index {
            SourceIndex::Tiles(tiles) => {
                let extent = tiles.options().extent;
                match tiles.get_tile(coord.z, coord.x as i64, coord.y) {
                    Some(tile) if !tile.features.is_empty() => {
                        encode_tile(&tile.features, extent).map(Some)
                    }
                    _ => Ok(None),
                }
            }
            SourceIndex::Clusters(clusters) => {
                let extent = clusters.options().extent as u32;
                match clusters.get_tile(coord.z, coord.x, coord.y) {
                    Some(features) => encode_tile(&features, extent).map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    fn clusters(&self) -> Result<&Supercluster> {
        match &self.index {
            Some(SourceIndex::Clusters(clusters)) => Ok(clusters),
            _ => Err(TilerError::invalid(format!(
                "source '{}' is not clustered",
                self.source_id
            ))),
        }
    }

    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8> {
        self.clusters()?.get_cluster_expansion_zoom(cluster_id)
    }

    pub fn get_cluster_children(&self, cluster_id: u64) -> Result<Vec<Feature>> {
        self.clusters()?.get_children(cluster_id)
    }

    pub fn get_cluster_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Result<Vec<Feature>> {
        self.clusters()?.get_leaves(cluster_id, limit, offset)
    }

    pub fn get_clusters(&self, bbox: [f64; 4], zoom: u8) -> Result<Vec<Feature>> {
        Ok(self.clusters()?.get_clusters(bbox, zoom))
    }

    /// Current data of an updateable source, as a feature collection.
    pub fn updateable_data(&self) -> Option<GeoJson> {
        self.updateable.as_ref().map(|data| {
            GeoJson::FeatureCollection(FeatureCollection {
                bbox: None,
                features: data.features(),
                foreign_members: None,
            })
        })
    }

    /// Drops the index and abandons any waiting load.
    pub fn remove_source(&mut self) {
        self.coalescer.abandon_pending();
        self.index = None;
        self.updateable = None;
    }
}
