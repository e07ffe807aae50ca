use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use geojson::{FeatureCollection, GeoJson};
use tracing::info;

use vt_tiler::cli::{Cli, Command, ReportFormat, SourceArgs, parse_bbox, parse_tile_spec};
use vt_tiler::encode::summarize_tile;
use vt_tiler::mbtiles::{ExportOptions, export_mbtiles};
use vt_tiler::options::LoadDataParams;
use vt_tiler::output::{
    export_ndjson, export_text, features_ndjson, features_text, tile_summary_ndjson,
    tile_summary_text,
};
use vt_tiler::worker::{
    GeoJsonWorkerSource, LoadDataOutcome, LoadDataResult, SourceKey, WorkerHandle, spawn_worker,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::Tile(args) => {
            let coord = parse_tile_spec(&args.tile)?;
            let (worker, key) = start_worker(read_params(&args.source, args.source.cluster)?)?;
            let tile = worker.load_tile(key, coord);
            worker.shutdown();
            let Some(tile) = tile? else {
                println!("tile {} is empty", coord);
                return Ok(());
            };
            if let Some(path) = args.output.as_ref() {
                fs::write(path, &tile.raw_data)
                    .with_context(|| format!("failed to write tile: {}", path.display()))?;
                info!(tile = %coord, bytes = tile.raw_data.len(), "wrote tile");
                return Ok(());
            }
            match args.format {
                ReportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&tile.vector_tile)?);
                }
                ReportFormat::Ndjson => {
                    let summary = summarize_tile(&tile.raw_data)?;
                    for line in tile_summary_ndjson(coord, &summary)? {
                        println!("{}", line);
                    }
                }
                ReportFormat::Text => {
                    let summary = summarize_tile(&tile.raw_data)?;
                    for line in tile_summary_text(coord, &summary) {
                        println!("{}", line);
                    }
                }
            }
        }
        Command::Clusters(args) => {
            let (worker, key) = start_worker(read_params(&args.source, true)?)?;
            let result = if let Some(cluster_id) = args.expansion_zoom {
                worker
                    .get_cluster_expansion_zoom(key, cluster_id)
                    .map(|zoom| {
                        println!("expansion_zoom: {}", zoom);
                        None
                    })
            } else if let Some(cluster_id) = args.children {
                worker.get_cluster_children(key, cluster_id).map(Some)
            } else if let Some(cluster_id) = args.leaves {
                worker
                    .get_cluster_leaves(key, cluster_id, args.limit, args.offset)
                    .map(Some)
            } else {
                let bbox = match args.bbox.as_deref() {
                    Some(value) => parse_bbox(value)?,
                    None => [-180.0, -90.0, 180.0, 90.0],
                };
                worker.get_clusters(key, bbox, args.zoom).map(Some)
            };
            worker.shutdown();
            if let Some(features) = result? {
                match args.format {
                    ReportFormat::Json => {
                        let collection = GeoJson::FeatureCollection(FeatureCollection {
                            bbox: None,
                            features,
                            foreign_members: None,
                        });
                        println!("{}", serde_json::to_string_pretty(&collection)?);
                    }
                    ReportFormat::Ndjson => {
                        for line in features_ndjson(&features)? {
                            println!("{}", line);
                        }
                    }
                    ReportFormat::Text => {
                        println!("features: {}", features.len());
                        for line in features_text(&features) {
                            println!("{}", line);
                        }
                    }
                }
            }
        }
        Command::Export(args) => {
            let mut source = load_source(read_params(&args.source, args.source.cluster)?)?;
            let index = source.index_mut().context("no data was indexed")?;
            let options = ExportOptions {
                min_zoom: args.min_zoom,
                max_zoom: args.max_zoom,
                gzip: !args.no_gzip,
                no_progress: args.no_progress,
                threads: args.threads,
                name: args.name.clone().unwrap_or_else(|| {
                    args.source
                        .input
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "geojson".to_string())
                }),
            };
            let report = export_mbtiles(index, &args.output, &options)?;
            match args.format {
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                ReportFormat::Ndjson => {
                    for line in export_ndjson(&report)? {
                        println!("{}", line);
                    }
                }
                ReportFormat::Text => {
                    for line in export_text(&report) {
                        println!("{}", line);
                    }
                }
            }
        }
    }

    Ok(())
}

fn read_params(args: &SourceArgs, cluster: bool) -> Result<LoadDataParams> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input: {}", args.input.display()))?;
    let data: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse input: {}", args.input.display()))?;
    let mut params = args.load_params(data)?;
    params.cluster = cluster;
    Ok(params)
}

fn loaded(outcome: LoadDataOutcome<LoadDataResult>) -> Result<LoadDataResult> {
    match outcome {
        LoadDataOutcome::Loaded(result) => {
            info!(
                features = result.feature_count,
                clustered = result.clustered,
                "indexed input"
            );
            Ok(result)
        }
        LoadDataOutcome::Abandoned => anyhow::bail!("load was superseded"),
    }
}

fn start_worker(params: LoadDataParams) -> Result<(WorkerHandle, SourceKey)> {
    let worker = spawn_worker("geojson-worker").context("failed to start worker")?;
    let key = SourceKey::new("cli", params.source.clone());
    let outcome = worker
        .load_data(key.clone(), params)?
        .recv()
        .context("worker stopped before finishing the load")??;
    loaded(outcome)?;
    worker.coalesce(key.clone())?;
    Ok((worker, key))
}

fn load_source(params: LoadDataParams) -> Result<GeoJsonWorkerSource> {
    let mut source = GeoJsonWorkerSource::new(params.source.clone());
    let (reply, response) =
        crossbeam_channel::bounded::<vt_tiler::Result<LoadDataOutcome<LoadDataResult>>>(1);
    source.load_data(
        params,
        Box::new(move |result| {
            let _ = reply.send(result);
        }),
    );
    loaded(response.recv().context("load did not complete")??)?;
    source.coalesce();
    Ok(source)
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
