use serde::{Deserialize, Serialize};

/// Side length of a map tile in world pixels.
pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: u8 = 0;
/// OpenFreeMap serves empty vector tiles above z14 for this style feed.
pub const MAX_ZOOM: u8 = 14;
/// Latitude bound of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Key of a map tile: grid position plus zoom level. At zoom `z` the
/// world is a `2^z` by `2^z` grid of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
  pub x: u32,
  pub y: u32,
  pub zoom: u8,
}

impl Tile {
  /// Whether both indices fall inside the grid of this zoom level.
  #[must_use]
  pub fn exists(&self) -> bool {
    let side = 1u32 << self.zoom;
    self.x < side && self.y < side
  }
}

/// Width of the whole map in world pixels at the given zoom.
#[must_use]
pub fn world_size(zoom: u8) -> f64 {
  TILE_SIZE * f64::from(1u32 << zoom)
}

/// Projects WGS84 coordinates to world pixels, origin at the top left,
/// y growing downwards. Latitude is clipped to the Mercator-valid range.
#[must_use]
pub fn latlon_to_world_pixel(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
  let scale = world_size(zoom);
  let x = (lon + 180.0) / 360.0 * scale;
  let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
  let sin_lat = (lat * std::f64::consts::PI / 180.0).sin();
  let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * std::f64::consts::PI)) * scale;
  (x, y)
}

/// Inverse of [`latlon_to_world_pixel`].
#[must_use]
pub fn world_pixel_to_latlon(wx: f64, wy: f64, zoom: u8) -> (f64, f64) {
  let scale = world_size(zoom);
  let lon = wx / scale * 360.0 - 180.0;
  let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * wy / scale;
  let lat = 180.0 / std::f64::consts::PI * n.sinh().atan();
  (lat, lon)
}

/// A view state brought back into range: zoom clamped, longitude wrapped,
/// latitude clipped, with the matching world-pixel camera position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedView {
  pub lat: f64,
  pub lon: f64,
  pub zoom: u8,
  pub wx: f64,
  pub wy: f64,
  pub world_size: f64,
}

/// Normalizes a view. Idempotent: normalizing a normalized view is a no-op.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_view(lat: f64, lon: f64, zoom: i32) -> NormalizedView {
  let zoom = zoom.clamp(i32::from(MIN_ZOOM), i32::from(MAX_ZOOM)) as u8;
  let (wx, wy) = latlon_to_world_pixel(lat, lon, zoom);
  let world_size = world_size(zoom);
  let wx = wx.rem_euclid(world_size);
  let wy = wy.clamp(0.0, world_size - 1.0);
  let (lat, lon) = world_pixel_to_latlon(wx, wy, zoom);
  NormalizedView {
    lat,
    lon,
    zoom,
    wx,
    wy,
    world_size,
  }
}
