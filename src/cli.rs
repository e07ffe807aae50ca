use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

use crate::options::{ClusterOptions, LoadDataParams, TilerOptions};
use crate::tiler::TileCoord;

#[derive(Debug, Parser)]
#[command(name = "vt-tiler", version, about = "Slice GeoJSON into vector tiles and point clusters")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the index and encode a single tile.
    Tile(TileArgs),
    /// Query the cluster hierarchy of a point source.
    Clusters(ClustersArgs),
    /// Write every non-empty tile of a zoom range into an MBTiles file.
    Export(ExportArgs),
}

/// Flags shared by every command describing how the source is indexed.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// GeoJSON file to index
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub cluster: bool,

    /// Filter expression (JSON) applied to each top-level feature
    #[arg(long)]
    pub filter: Option<String>,

    /// Cluster aggregations as JSON: {"name": [operator, mapExpression]}
    #[arg(long)]
    pub cluster_properties: Option<String>,

    #[arg(long)]
    pub promote_id: Option<String>,

    #[arg(long, default_value_t = false)]
    pub generate_id: bool,

    /// Deepest zoom the tiler keeps full detail for
    #[arg(long, default_value_t = 14)]
    pub vt_max_zoom: u8,

    #[arg(long, default_value_t = 5)]
    pub index_max_zoom: u8,

    #[arg(long, default_value_t = 100_000)]
    pub index_max_points: u32,

    #[arg(long, default_value_t = 3.0)]
    pub tolerance: f64,

    #[arg(long, default_value_t = 4096)]
    pub extent: u32,

    #[arg(long, default_value_t = 64)]
    pub buffer: u32,

    #[arg(long, default_value_t = false)]
    pub line_metrics: bool,

    #[arg(long, default_value_t = 0)]
    pub cluster_min_zoom: u8,

    #[arg(long, default_value_t = 16)]
    pub cluster_max_zoom: u8,

    #[arg(long, default_value_t = 2)]
    pub cluster_min_points: u32,

    /// Cluster radius in pixels
    #[arg(long, default_value_t = 40.0)]
    pub cluster_radius: f64,

    #[arg(long, default_value_t = 512.0)]
    pub cluster_extent: f64,

    #[arg(long, default_value_t = 64)]
    pub node_size: usize,
}

impl SourceArgs {
    pub fn tiler_options(&self) -> TilerOptions {
        TilerOptions {
            max_zoom: self.vt_max_zoom,
            index_max_zoom: self.index_max_zoom,
            index_max_points: self.index_max_points,
            tolerance: self.tolerance,
            extent: self.extent,
            buffer: self.buffer,
            line_metrics: self.line_metrics,
            promote_id: None,
            generate_id: self.generate_id,
        }
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            min_zoom: self.cluster_min_zoom,
            max_zoom: self.cluster_max_zoom,
            min_points: self.cluster_min_points,
            radius: self.cluster_radius,
            extent: self.cluster_extent,
            node_size: self.node_size,
            generate_id: self.generate_id,
        }
    }

    /// Builds the load request for `data`, parsing the JSON-valued flags.
    pub fn load_params(&self, data: Value) -> Result<LoadDataParams> {
        let filter = match self.filter.as_deref() {
            Some(text) => Some(serde_json::from_str(text).context("invalid --filter JSON")?),
            None => None,
        };
        let cluster_properties = match self.cluster_properties.as_deref() {
            Some(text) => {
                Some(serde_json::from_str(text).context("invalid --cluster-properties JSON")?)
            }
            None => None,
        };
        Ok(LoadDataParams {
            source: self.input.display().to_string(),
            data: Some(data),
            data_diff: None,
            cluster: self.cluster,
            supercluster_options: self.cluster_options(),
            geojson_vt_options: self.tiler_options(),
            cluster_properties,
            filter,
            promote_id: self.promote_id.clone(),
        })
    }
}

#[derive(Debug, Args)]
pub struct TileArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Tile to encode, as z/x/y
    #[arg(long)]
    pub tile: String,

    /// Write the encoded tile here instead of printing a summary
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct ClustersArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, default_value_t = 0)]
    pub zoom: u8,

    /// west,south,east,north
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    #[arg(long)]
    pub expansion_zoom: Option<u64>,

    #[arg(long)]
    pub children: Option<u64>,

    #[arg(long)]
    pub leaves: Option<u64>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub min_zoom: u8,

    #[arg(long, default_value_t = 5)]
    pub max_zoom: u8,

    #[arg(long)]
    pub threads: Option<usize>,

    /// Store tiles without gzip compression
    #[arg(long, default_value_t = false)]
    pub no_gzip: bool,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Ndjson,
}

pub fn parse_tile_spec(value: &str) -> Result<TileCoord> {
    let trimmed = value.trim();
    let mut parts = trimmed.split('/');
    let zoom_str = parts.next().context("tile must be in z/x/y format")?;
    let x_str = parts.next().context("tile must be in z/x/y format")?;
    let y_str = parts.next().context("tile must be in z/x/y format")?;
    if parts.next().is_some() {
        anyhow::bail!("tile must be in z/x/y format");
    }
    let z: u8 = zoom_str.parse().context("invalid tile zoom")?;
    let x: u32 = x_str.parse().context("invalid tile x")?;
    let y: u32 = y_str.parse().context("invalid tile y")?;
    Ok(TileCoord { z, x, y })
}

pub fn parse_bbox(value: &str) -> Result<[f64; 4]> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        anyhow::bail!("bbox must be west,south,east,north");
    }
    let mut bbox = [0.0; 4];
    for (slot, part) in bbox.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .with_context(|| format!("invalid bbox value: {part}"))?;
    }
    Ok(bbox)
}
