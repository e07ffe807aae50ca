use clap::{CommandFactory, Parser};
use serde_json::json;

use vt_tiler::cli::{Cli, Command, ReportFormat, parse_bbox, parse_tile_spec};
use vt_tiler::tiler::TileCoord;

#[test]
fn parse_tile_minimal() {
    let cli = Cli::parse_from(["vt-tiler", "tile", "points.geojson", "--tile", "3/4/2"]);
    assert_eq!(cli.log, "info");
    match cli.command {
        Command::Tile(args) => {
            assert_eq!(args.source.input.as_os_str(), "points.geojson");
            assert_eq!(args.tile, "3/4/2");
            assert_eq!(args.output, None);
            assert_eq!(args.format, ReportFormat::Text);
            assert!(!args.source.cluster);

            let options = args.source.tiler_options();
            assert_eq!(options.max_zoom, 14);
            assert_eq!(options.index_max_zoom, 5);
            assert_eq!(options.index_max_points, 100_000);
            assert_eq!(options.tolerance, 3.0);
            assert_eq!(options.extent, 4096);
            assert_eq!(options.buffer, 64);
            assert!(!options.line_metrics);
        }
        _ => panic!("expected tile command"),
    }
}

#[test]
fn parse_tile_options() {
    let cli = Cli::parse_from([
        "vt-tiler",
        "--log",
        "debug",
        "tile",
        "roads.geojson",
        "--tile",
        "0/0/0",
        "--output",
        "tile.pbf",
        "--format",
        "ndjson",
        "--vt-max-zoom",
        "10",
        "--extent",
        "512",
        "--line-metrics",
        "--promote-id",
        "osm_id",
        "--filter",
        "[\"==\", \"class\", \"primary\"]",
    ]);
    assert_eq!(cli.log, "debug");
    match cli.command {
        Command::Tile(args) => {
            assert_eq!(args.output.expect("output").as_os_str(), "tile.pbf");
            assert_eq!(args.format, ReportFormat::Ndjson);
            let params = args.source.load_params(json!({})).expect("params");
            assert_eq!(params.source, "roads.geojson");
            assert_eq!(params.geojson_vt_options.max_zoom, 10);
            assert_eq!(params.geojson_vt_options.extent, 512);
            assert!(params.geojson_vt_options.line_metrics);
            assert_eq!(params.promote_id.as_deref(), Some("osm_id"));
            assert_eq!(params.tiler_options().promote_id.as_deref(), Some("osm_id"));
            assert_eq!(params.filter, Some(json!(["==", "class", "primary"])));
        }
        _ => panic!("expected tile command"),
    }
}

#[test]
fn parse_clusters_options() {
    let cli = Cli::parse_from([
        "vt-tiler",
        "clusters",
        "places.geojson",
        "--zoom",
        "3",
        "--bbox",
        "-10.5,-20,30,40",
        "--cluster-radius",
        "60",
        "--cluster-max-zoom",
        "12",
        "--cluster-min-points",
        "5",
        "--cluster-properties",
        "{\"sum\": [\"+\", [\"get\", \"count\"]]}",
        "--leaves",
        "42",
        "--limit",
        "20",
        "--offset",
        "5",
    ]);
    match cli.command {
        Command::Clusters(args) => {
            assert_eq!(args.zoom, 3);
            assert_eq!(args.bbox.as_deref(), Some("-10.5,-20,30,40"));
            assert_eq!(args.leaves, Some(42));
            assert_eq!(args.limit, 20);
            assert_eq!(args.offset, 5);
            assert_eq!(args.expansion_zoom, None);

            let options = args.source.cluster_options();
            assert_eq!(options.radius, 60.0);
            assert_eq!(options.max_zoom, 12);
            assert_eq!(options.min_points, 5);
            assert_eq!(options.extent, 512.0);
            assert_eq!(options.node_size, 64);

            let params = args.source.load_params(json!({})).expect("params");
            assert_eq!(
                params.cluster_properties,
                Some(json!({"sum": ["+", ["get", "count"]]}))
            );
        }
        _ => panic!("expected clusters command"),
    }
}

#[test]
fn parse_export_defaults() {
    let cli = Cli::parse_from([
        "vt-tiler",
        "export",
        "points.geojson",
        "--output",
        "points.mbtiles",
    ]);
    match cli.command {
        Command::Export(args) => {
            assert_eq!(args.output.as_os_str(), "points.mbtiles");
            assert_eq!(args.min_zoom, 0);
            assert_eq!(args.max_zoom, 5);
            assert_eq!(args.threads, None);
            assert!(!args.no_gzip);
            assert!(!args.no_progress);
            assert_eq!(args.name, None);
        }
        _ => panic!("expected export command"),
    }
}

#[test]
fn invalid_json_flags_are_reported() {
    let cli = Cli::parse_from([
        "vt-tiler",
        "tile",
        "points.geojson",
        "--tile",
        "0/0/0",
        "--filter",
        "[not json",
    ]);
    let Command::Tile(args) = cli.command else {
        panic!("expected tile command");
    };
    let err = args.source.load_params(json!({})).expect_err("bad filter");
    assert!(err.to_string().contains("--filter"));
}

#[test]
fn tile_spec_parses_and_rejects() {
    assert_eq!(
        parse_tile_spec(" 5/17/11 ").expect("tile"),
        TileCoord { z: 5, x: 17, y: 11 }
    );
    assert!(parse_tile_spec("5/17").is_err());
    assert!(parse_tile_spec("5/17/11/2").is_err());
    assert!(parse_tile_spec("a/b/c").is_err());
}

#[test]
fn bbox_parses_and_rejects() {
    assert_eq!(
        parse_bbox("-180, -85.5, 180, 85.5").expect("bbox"),
        [-180.0, -85.5, 180.0, 85.5]
    );
    assert!(parse_bbox("1,2,3").is_err());
    assert!(parse_bbox("1,2,x,4").is_err());
}

#[test]
fn export_help_describes_flags() {
    let mut cmd = Cli::command();
    let export = cmd.find_subcommand_mut("export").expect("export command");
    let mut buffer = Vec::new();
    export.write_long_help(&mut buffer).expect("help");
    let help = String::from_utf8(buffer).expect("utf8");

    assert!(help.contains("Store tiles without gzip compression"));
    assert!(help.contains("GeoJSON file to index"));
    assert!(help.contains("--cluster-radius"));
}
