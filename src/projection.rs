use std::f64::consts::PI;

use serde::Deserialize;

use crate::data::transit::GeoPoint;

pub const TILE_SIZE: f64 = 256.0;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Viewport {
    pub center: GeoPoint,
    pub zoom: u8,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            center: GeoPoint::new(18.79885, 98.95064),
            zoom: 16,
            width_px: 800,
            height_px: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// A tile and the viewport position of its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub key: TileKey,
    pub offset: (f32, f32),
}

/// Web Mercator pixel position at `zoom`, origin at the north-west corner of the world.
pub fn world_px(point: &GeoPoint, zoom: u8) -> (f64, f64) {
    let world_size = TILE_SIZE * f64::from(1u32 << zoom);
    let lat_rad = point.lat.to_radians();
    let x = (point.lon + 180.0) / 360.0 * world_size;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * world_size;
    (x, y)
}

/// Maps geographic coordinates onto the pixels of a fixed viewport.
pub struct ViewportProjection {
    origin_x: f64,
    origin_y: f64,
    zoom: u8,
    width_px: u32,
    height_px: u32,
}

impl ViewportProjection {
    pub fn new(viewport: &Viewport) -> Self {
        let (center_x, center_y) = world_px(&viewport.center, viewport.zoom);
        ViewportProjection {
            origin_x: center_x - f64::from(viewport.width_px) / 2.0,
            origin_y: center_y - f64::from(viewport.height_px) / 2.0,
            zoom: viewport.zoom,
            width_px: viewport.width_px,
            height_px: viewport.height_px,
        }
    }

    pub fn project(&self, point: &GeoPoint) -> (f32, f32) {
        let (x, y) = world_px(point, self.zoom);
        ((x - self.origin_x) as f32, (y - self.origin_y) as f32)
    }

    /// Tiles overlapping the viewport, row by row. When the viewport is wider than
    /// the world the same key shows up once per repetition, each with its own offset.
    pub fn visible_tiles(&self) -> Vec<TilePlacement> {
        let tiles_per_side = 1i64 << self.zoom;
        let first_x = (self.origin_x / TILE_SIZE).floor() as i64;
        let first_y = (self.origin_y / TILE_SIZE).floor() as i64;
        let last_x = ((self.origin_x + f64::from(self.width_px)) / TILE_SIZE).ceil() as i64 - 1;
        let last_y = ((self.origin_y + f64::from(self.height_px)) / TILE_SIZE).ceil() as i64 - 1;

        let mut tiles = Vec::new();
        for y in first_y.max(0)..=last_y.min(tiles_per_side - 1) {
            for x in first_x..=last_x {
                tiles.push(TilePlacement {
                    key: TileKey {
                        z: self.zoom,
                        x: x.rem_euclid(tiles_per_side) as u32,
                        y: y as u32,
                    },
                    offset: (
                        (x as f64 * TILE_SIZE - self.origin_x) as f32,
                        (y as f64 * TILE_SIZE - self.origin_y) as f32,
                    ),
                });
            }
        }
        tiles
    }
}
