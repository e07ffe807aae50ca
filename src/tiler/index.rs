use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use geojson::Feature;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::options::{MAX_SUPPORTED_ZOOM, TilerOptions};
use crate::tiler::clip::{clip, wrap};
use crate::tiler::convert::convert;
use crate::tiler::tile::Tile;
use crate::tiler::types::VtFeature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Single integer key of a tile: `((2^z * y + x) * 32) + z`.
pub fn tile_id(z: u8, x: u32, y: u32) -> u64 {
    (((1u64 << z) * y as u64 + x as u64) * 32) + z as u64
}

/// Quad-tree of clipped tiles built eagerly down to `index_max_zoom` and
/// lazily below it.
#[derive(Debug)]
pub struct GeoJsonVt {
    options: TilerOptions,
    tiles: HashMap<u64, Tile>,
    tile_coords: Vec<TileCoord>,
}

impl GeoJsonVt {
    pub fn new(features: &[Feature], options: TilerOptions) -> Result<Self> {
        options.validate()?;

        let started = Instant::now();
        let prepared = convert(features, &options)?;
        debug!(
            features = prepared.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preprocessed data"
        );

        let buffer = options.buffer as f64 / options.extent as f64;
        let prepared = wrap(prepared, buffer, options.line_metrics);

        let mut index = Self {
            options,
            tiles: HashMap::new(),
            tile_coords: Vec::new(),
        };
        if !prepared.is_empty() {
            let started = Instant::now();
            index.split_tile(prepared, 0, 0, 0, None);
            debug!(
                tiles = index.tiles.len(),
                index_max_zoom = index.options.index_max_zoom,
                index_max_points = index.options.index_max_points,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "generated tiles"
            );
        }
        Ok(index)
    }

    pub fn options(&self) -> &TilerOptions {
        &self.options
    }

    /// Coordinates of every node built so far, in creation order.
    pub fn tile_coords(&self) -> &[TileCoord] {
        &self.tile_coords
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Splits `features` into the subtree rooted at `z/x/y`.
    ///
    /// Without a `target` this is the eager pass bounded by `index_max_zoom`
    /// and `index_max_points`; with one, only the ancestors of the target
    /// are split, down to the target itself.
    fn split_tile(
        &mut self,
        features: Vec<Arc<VtFeature>>,
        z: u8,
        x: u32,
        y: u32,
        target: Option<TileCoord>,
    ) {
        let options = &self.options;
        let mut stack = vec![(features, z, x, y)];

        while let Some((features, z, x, y)) = stack.pop() {
            let z2 = (1u64 << z) as f64;
            let id = tile_id(z, x, y);
            let tile = self.tiles.entry(id).or_insert_with(|| {
                self.tile_coords.push(TileCoord::new(z, x, y));
                Tile::create(&features, z, x, y, options)
            });

            let stop = match target {
                None => {
                    z >= options.index_max_zoom.min(options.max_zoom)
                        || tile.num_points <= options.index_max_points as usize
                }
                Some(target) => {
                    if z == options.max_zoom || z == target.z {
                        true
                    } else {
                        let steps = target.z - z;
                        x != target.x >> steps || y != target.y >> steps
                    }
                }
            };
            if stop {
                tile.source = Some(features);
                continue;
            }

            tile.source = None;
            if features.is_empty() {
                continue;
            }

            let k1 = 0.5 * options.buffer as f64 / options.extent as f64;
            let k2 = 0.5 - k1;
            let k3 = 0.5 + k1;
            let k4 = 1.0 + k1;
            let (xf, yf) = (x as f64, y as f64);
            let bbox = tile.bbox;
            let metrics = options.line_metrics;

            let left = clip(&features, z2, xf - k1, xf + k3, 0, bbox.min_x, bbox.max_x, metrics);
            let right = clip(&features, z2, xf + k2, xf + k4, 0, bbox.min_x, bbox.max_x, metrics);
            drop(features);

            let halves = |half: Option<Vec<Arc<VtFeature>>>| match half {
                Some(half) => (
                    clip(&half, z2, yf - k1, yf + k3, 1, bbox.min_y, bbox.max_y, metrics),
                    clip(&half, z2, yf + k2, yf + k4, 1, bbox.min_y, bbox.max_y, metrics),
                ),
                None => (None, None),
            };
            let (tl, bl) = halves(left);
            let (tr, br) = halves(right);

            stack.push((tl.unwrap_or_default(), z + 1, x * 2, y * 2));
            stack.push((bl.unwrap_or_default(), z + 1, x * 2, y * 2 + 1));
            stack.push((tr.unwrap_or_default(), z + 1, x * 2 + 1, y * 2));
            stack.push((br.unwrap_or_default(), z + 1, x * 2 + 1, y * 2 + 1));
        }
    }

    /// Returns tile `z/x/y` in tile-local coordinates, drilling down from the
    /// nearest ancestor that still holds source geometry. `x` wraps around the
    /// antimeridian.
    pub fn get_tile(&mut self, z: u8, x: i64, y: u32) -> Option<&Tile> {
        if z > MAX_SUPPORTED_ZOOM {
            return None;
        }
        let z2 = 1u64 << z;
        if y as u64 >= z2 {
            return None;
        }
        let x = x.rem_euclid(z2 as i64) as u32;
        let id = tile_id(z, x, y);

        if !self.tiles.contains_key(&id) {
            let (mut z0, mut x0, mut y0) = (z, x, y);
            let mut parent = None;
            while parent.is_none() && z0 > 0 {
                z0 -= 1;
                x0 >>= 1;
                y0 >>= 1;
                parent = self.tiles.get(&tile_id(z0, x0, y0)).map(|_| (z0, x0, y0));
            }
            let (pz, px, py) = parent?;
            let source = self.tiles.get_mut(&tile_id(pz, px, py))?.source.take()?;

            let started = Instant::now();
            self.split_tile(source, pz, px, py, Some(TileCoord::new(z, x, y)));
            debug!(
                z,
                x,
                y,
                parent_z = pz,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "drilled down"
            );
        }

        let extent = self.options.extent;
        let tile = self.tiles.get_mut(&id)?;
        tile.transform(extent);
        Some(&*tile)
    }
}
