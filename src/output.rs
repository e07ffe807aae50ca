use anyhow::Result;
use geojson::Feature;
use serde_json::{Value, json};

use crate::encode::TileSummary;
use crate::input::id_to_value;
use crate::mbtiles::ExportReport;
use crate::tiler::TileCoord;

pub fn tile_summary_text(coord: TileCoord, summary: &TileSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "tile: {} bytes={} layers={}",
        coord,
        summary.bytes,
        summary.layers.len()
    )];
    for layer in summary.layers.iter() {
        lines.push(format!(
            "layer: {} extent={} features={} points={} lines={} polygons={} property_keys={}",
            layer.name,
            layer.extent,
            layer.feature_count,
            layer.points,
            layer.lines,
            layer.polygons,
            layer.keys.len()
        ));
    }
    lines
}

pub fn tile_summary_ndjson(coord: TileCoord, summary: &TileSummary) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(summary.layers.len() + 1);
    lines.push(serde_json::to_string(&json!({
        "type": "tile",
        "tile": coord,
        "bytes": summary.bytes,
    }))?);
    for layer in summary.layers.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "layer",
            "layer": layer,
        }))?);
    }
    Ok(lines)
}

fn coordinates(feature: &Feature) -> String {
    match feature.geometry.as_ref().map(|geometry| &geometry.value) {
        Some(geojson::Value::Point(position)) if position.len() >= 2 => {
            format!("{:.6},{:.6}", position[0], position[1])
        }
        Some(_) => "non-point".to_string(),
        None => "none".to_string(),
    }
}

/// One line per point or cluster.
pub fn features_text(features: &[Feature]) -> Vec<String> {
    features
        .iter()
        .map(|feature| {
            let id = feature
                .id
                .as_ref()
                .map(id_to_value)
                .unwrap_or(Value::Null);
            let count = feature
                .property("point_count")
                .cloned()
                .unwrap_or(Value::from(1));
            let cluster = feature
                .property("cluster")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            format!(
                "{} id={} points={} at={}",
                if cluster { "cluster" } else { "point" },
                id,
                count,
                coordinates(feature)
            )
        })
        .collect()
}

pub fn features_ndjson(features: &[Feature]) -> Result<Vec<String>> {
    features
        .iter()
        .map(|feature| Ok(serde_json::to_string(feature)?))
        .collect()
}

pub fn export_text(report: &ExportReport) -> Vec<String> {
    let mut lines = vec![format!(
        "tiles: {} total_bytes: {}",
        report.tile_count, report.total_bytes
    )];
    for zoom in report.by_zoom.iter() {
        lines.push(format!(
            "z={}: tiles={} bytes={}",
            zoom.zoom, zoom.tiles, zoom.bytes
        ));
    }
    lines
}

pub fn export_ndjson(report: &ExportReport) -> Result<Vec<String>> {
    let mut lines = vec![serde_json::to_string(&json!({
        "type": "summary",
        "tile_count": report.tile_count,
        "total_bytes": report.total_bytes,
    }))?];
    for zoom in report.by_zoom.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "zoom",
            "zoom": zoom,
        }))?);
    }
    Ok(lines)
}
