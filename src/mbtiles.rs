use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::encode::{GEOJSON_TILE_LAYER_NAME, encode_tile};
use crate::tiler::{TileCoord, TileFeature, lat_y, lng_x};
use crate::worker::SourceIndex;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub gzip: bool,
    pub no_progress: bool,
    pub threads: Option<usize>,
    /// Value of the `name` metadata row.
    pub name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 5,
            gzip: true,
            no_progress: false,
            threads: None,
            name: "geojson".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoomTileCount {
    pub zoom: u8,
    pub tiles: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub tile_count: u64,
    pub total_bytes: u64,
    pub by_zoom: Vec<ZoomTileCount>,
}

/// A materialized tile waiting to be encoded.
#[derive(Debug, Clone)]
pub struct PendingTile {
    pub coord: TileCoord,
    pub extent: u32,
    pub features: Vec<TileFeature>,
}

struct EncodedTile {
    coord: TileCoord,
    data: Vec<u8>,
}

pub fn decode_tile_payload(data: &[u8]) -> Result<Vec<u8>> {
    if data.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .context("decode gzip tile data")?;
        Ok(decoded)
    } else {
        Ok(data.to_vec())
    }
}

pub fn encode_tile_payload(data: &[u8], gzip: bool) -> Result<Vec<u8>> {
    if !gzip {
        return Ok(data.to_vec());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).context("encode gzip tile data")?;
    let encoded = encoder.finish().context("finish gzip tile data")?;
    Ok(encoded)
}

/// MBTiles rows count tiles from the bottom (TMS).
pub fn tms_row(z: u8, y: u32) -> u32 {
    ((1u64 << z) - 1 - y as u64) as u32
}

fn ensure_mbtiles_path(path: &Path) -> Result<()> {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("mbtiles") {
        Ok(())
    } else {
        anyhow::bail!("only .mbtiles output paths are supported");
    }
}

fn make_progress_bar(total: u64) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    Ok(bar)
}

/// Materializes every non-empty tile of `index` between the two zooms.
pub fn collect_tiles(index: &mut SourceIndex, min_zoom: u8, max_zoom: u8) -> Vec<PendingTile> {
    match index {
        SourceIndex::Tiles(tiles) => {
            let extent = tiles.options().extent;
            let mut pending = Vec::new();
            let mut queue = VecDeque::from([TileCoord::new(0, 0, 0)]);
            while let Some(coord) = queue.pop_front() {
                let Some(tile) = tiles.get_tile(coord.z, coord.x as i64, coord.y) else {
                    continue;
                };
                if tile.num_features == 0 {
                    continue;
                }
                if coord.z >= min_zoom && !tile.features.is_empty() {
                    pending.push(PendingTile {
                        coord,
                        extent,
                        features: tile.features.clone(),
                    });
                }
                if coord.z < max_zoom {
                    let (x, y) = (coord.x * 2, coord.y * 2);
                    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                        queue.push_back(TileCoord::new(coord.z + 1, x + dx, y + dy));
                    }
                }
            }
            pending
        }
        SourceIndex::Clusters(clusters) => {
            let extent = clusters.options().extent as u32;
            let mut pending = Vec::new();
            for z in min_zoom..=max_zoom {
                let z2 = 1i64 << z;
                let mut candidates = BTreeSet::new();
                for feature in clusters.get_clusters([-180.0, -90.0, 180.0, 90.0], z) {
                    let Some((lng, lat)) = feature_point(&feature) else {
                        continue;
                    };
                    let tx = (lng_x(lng) * z2 as f64).floor() as i64;
                    let ty = (lat_y(lat) * z2 as f64).floor() as i64;
                    for dx in -1..=1 {
                        for dy in -1..=1 {
                            let y = ty + dy;
                            if (0..z2).contains(&y) {
                                candidates.insert(((tx + dx).rem_euclid(z2) as u32, y as u32));
                            }
                        }
                    }
                }
                for (x, y) in candidates {
                    if let Some(features) = clusters.get_tile(z, x, y) {
                        pending.push(PendingTile {
                            coord: TileCoord::new(z, x, y),
                            extent,
                            features,
                        });
                    }
                }
            }
            pending
        }
    }
}

fn feature_point(feature: &geojson::Feature) -> Option<(f64, f64)> {
    match &feature.geometry.as_ref()?.value {
        geojson::Value::Point(position) if position.len() >= 2 => Some((position[0], position[1])),
        _ => None,
    }
}

fn create_output(path: &Path) -> Result<Connection> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to replace output: {}", path.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open output mbtiles: {}", path.display()))?;
    conn.execute_batch(
        "
        CREATE TABLE metadata (name TEXT, value TEXT);
        CREATE TABLE tiles (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            tile_data BLOB
        );
        CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);
        ",
    )
    .context("failed to create output schema")?;
    Ok(conn)
}

fn metadata_rows(options: &ExportOptions) -> Vec<(&'static str, String)> {
    let vector_layers = serde_json::json!({
        "vector_layers": [{
            "id": GEOJSON_TILE_LAYER_NAME,
            "fields": {},
            "minzoom": options.min_zoom,
            "maxzoom": options.max_zoom,
        }]
    });
    vec![
        ("name", options.name.clone()),
        ("format", "pbf".to_string()),
        ("type", "overlay".to_string()),
        ("minzoom", options.min_zoom.to_string()),
        ("maxzoom", options.max_zoom.to_string()),
        ("json", vector_layers.to_string()),
    ]
}

fn write_tiles(
    mut conn: Connection,
    options: &ExportOptions,
    tiles: Receiver<EncodedTile>,
    progress: ProgressBar,
) -> Result<ExportReport> {
    let tx = conn.transaction().context("begin output transaction")?;
    for (name, value) in metadata_rows(options) {
        tx.execute(
            "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )
        .context("insert metadata")?;
    }

    let mut by_zoom: BTreeMap<u8, ZoomTileCount> = BTreeMap::new();
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
            )
            .context("prepare tile insert")?;
        for tile in tiles {
            let TileCoord { z, x, y } = tile.coord;
            stmt.execute(params![z, x, tms_row(z, y), tile.data])
                .context("insert tile")?;
            let entry = by_zoom.entry(z).or_insert(ZoomTileCount {
                zoom: z,
                tiles: 0,
                bytes: 0,
            });
            entry.tiles += 1;
            entry.bytes += tile.data.len() as u64;
            progress.inc(1);
        }
    }
    tx.commit().context("commit output")?;

    let by_zoom: Vec<ZoomTileCount> = by_zoom.into_values().collect();
    Ok(ExportReport {
        tile_count: by_zoom.iter().map(|zoom| zoom.tiles).sum(),
        total_bytes: by_zoom.iter().map(|zoom| zoom.bytes).sum(),
        by_zoom,
    })
}

/// Writes every non-empty tile between `min_zoom` and `max_zoom` into a new
/// MBTiles file. Tiles are encoded in parallel and stored by a single writer.
pub fn export_mbtiles(
    index: &mut SourceIndex,
    output: &Path,
    options: &ExportOptions,
) -> Result<ExportReport> {
    ensure_mbtiles_path(output)?;
    if options.min_zoom > options.max_zoom {
        anyhow::bail!("--min-zoom must not exceed --max-zoom");
    }

    let pending = collect_tiles(index, options.min_zoom, options.max_zoom);
    info!(tiles = pending.len(), "collected tiles");
    let progress = if options.no_progress {
        ProgressBar::hidden()
    } else {
        make_progress_bar(pending.len() as u64)?
    };

    let conn = create_output(output)?;
    let (sender, receiver) = bounded::<EncodedTile>(256);
    let writer_options = options.clone();
    let writer_progress = progress.clone();
    let writer = thread::Builder::new()
        .name("mbtiles-writer".to_string())
        .spawn(move || write_tiles(conn, &writer_options, receiver, writer_progress))
        .context("spawn tile writer")?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = options.threads {
        pool = pool.num_threads(threads);
    }
    let pool = pool.build().context("build encoder thread pool")?;
    let gzip = options.gzip;
    let encoded: Result<()> = pool.install(|| {
        pending.par_iter().try_for_each_with(sender, |sender, tile| {
            let result = encode_tile(&tile.features, tile.extent)
                .with_context(|| format!("encode tile {}", tile.coord))?;
            let data = encode_tile_payload(&result.raw_data, gzip)?;
            sender
                .send(EncodedTile {
                    coord: tile.coord,
                    data,
                })
                .context("tile writer stopped")
        })
    });

    let report = writer
        .join()
        .map_err(|_| anyhow::anyhow!("tile writer panicked"))??;
    encoded?;
    progress.finish_and_clear();
    debug!(
        tiles = report.tile_count,
        bytes = report.total_bytes,
        "export finished"
    );
    Ok(report)
}
