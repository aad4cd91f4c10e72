mod labels;
pub mod style;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::map::coordinates::{self, TILE_SIZE, Tile};
use crate::map::framebuffer::Framebuffer;
use crate::map::mvt::{DecodedTile, Geometry, Layer, TilePoint, Value};
use crate::map::tile_loader::CachedTileLoader;
use crate::map::view::WORLD_PX_PER_CELL_Y;

pub use labels::LABEL_MIN_ZOOM;

pub const MIN_WIDTH: usize = 20;
pub const MAX_WIDTH: usize = 320;
pub const MIN_HEIGHT: usize = 10;
pub const MAX_HEIGHT: usize = 140;
pub const MIN_CELL_ASPECT: f64 = 0.2;
pub const MAX_CELL_ASPECT: f64 = 2.0;

/// Water polygons are only filled up to this zoom; beyond it outlines
/// are enough and much cheaper.
pub const TERRAIN_FILL_MAX_ZOOM: u8 = 14;
/// From this zoom on, oversized rings and lines are thinned out.
pub const GEOM_SIMPLIFY_ZOOM: u8 = 14;
pub const MAX_GEOM_POINTS: usize = 220;

/// A rendered frame plus the normalized view it shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
  /// `height` newline-separated lines of exactly `width` characters.
  pub text: String,
  pub lat: f64,
  pub lon: f64,
  pub zoom: u8,
  pub width: usize,
  pub height: usize,
  pub cell_aspect: f64,
}

/// The world-pixel window a framebuffer shows.
#[derive(Debug, Clone, Copy)]
struct Viewport {
  tl_wx: f64,
  tl_wy: f64,
  cell_aspect: f64,
  width: usize,
  height: usize,
  zoom: u8,
}

impl Viewport {
  /// World pixel to cell coordinates. One cell spans `cell_aspect` world
  /// pixels horizontally and exactly one vertically.
  #[allow(clippy::cast_possible_truncation)]
  fn world_to_screen(&self, wx: f64, wy: f64) -> (i32, i32) {
    let sx = ((wx - self.tl_wx) / self.cell_aspect).floor() as i32;
    let sy = ((wy - self.tl_wy) / WORLD_PX_PER_CELL_Y).floor() as i32;
    (sx, sy)
  }

  #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
  fn contains(&self, sx: i32, sy: i32) -> bool {
    sx >= 0 && sx < self.width as i32 && sy >= 0 && sy < self.height as i32
  }
}

/// Projects tile-local geometry of one tile into a viewport. The unwrapped
/// tile index keeps geometry west or east of the antimeridian where the
/// camera expects it.
#[derive(Debug, Clone, Copy)]
struct TilePainter {
  viewport: Viewport,
  tx: i64,
  ty: i64,
}

impl TilePainter {
  #[allow(clippy::cast_precision_loss)]
  fn project(&self, point: TilePoint, extent: u32) -> (i32, i32) {
    let extent = f64::from(extent);
    let wx = self.tx as f64 * TILE_SIZE + point.0 as f64 / extent * TILE_SIZE;
    let wy = self.ty as f64 * TILE_SIZE + point.1 as f64 / extent * TILE_SIZE;
    self.viewport.world_to_screen(wx, wy)
  }
}

/// Stride-samples oversized rings and lines at max zoom, always keeping
/// the original last vertex.
fn simplify(points: &[TilePoint], zoom: u8) -> Cow<'_, [TilePoint]> {
  if zoom < GEOM_SIMPLIFY_ZOOM || points.len() <= MAX_GEOM_POINTS {
    return Cow::Borrowed(points);
  }
  let step = points.len().div_ceil(MAX_GEOM_POINTS).max(2);
  let mut sampled: Vec<TilePoint> = points.iter().copied().step_by(step).collect();
  if let Some(&last) = points.last()
    && sampled.last() != Some(&last)
  {
    sampled.push(last);
  }
  Cow::Owned(sampled)
}

/// Renders map views into ASCII framebuffers, pulling tiles from an owned
/// [`CachedTileLoader`].
pub struct MapRenderer {
  loader: CachedTileLoader,
}

impl MapRenderer {
  #[must_use]
  pub fn new(loader: CachedTileLoader) -> Self {
    Self { loader }
  }

  /// Number of decoded tiles held by the underlying store.
  #[must_use]
  pub fn tile_cache_size(&self) -> usize {
    self.loader.tile_cache_size()
  }

  /// Queues a one-tile ring around the rendered view for background cache
  /// warming, so the next pan hits disk instead of the network.
  #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
  pub fn prefetch_neighbors(&self, result: &RenderResult) {
    let view = coordinates::normalize_view(result.lat, result.lon, i32::from(result.zoom));
    #[allow(clippy::cast_precision_loss)]
    let view_world_w = result.width as f64 * result.cell_aspect;
    #[allow(clippy::cast_precision_loss)]
    let view_world_h = result.height as f64 * WORLD_PX_PER_CELL_Y;
    let tl_wx = view.wx - view_world_w / 2.0;
    let tl_wy = view.wy - view_world_h / 2.0;

    let world_tiles = 1i64 << view.zoom;
    let min_tx = (tl_wx / TILE_SIZE).floor() as i64 - 1;
    let max_tx = ((tl_wx + view_world_w) / TILE_SIZE).floor() as i64 + 1;
    let min_ty = ((tl_wy / TILE_SIZE).floor() as i64 - 1).max(0);
    let max_ty = (((tl_wy + view_world_h) / TILE_SIZE).floor() as i64 + 1).min(world_tiles - 1);

    let zoom = view.zoom;
    let tiles = (min_tx..=max_tx).flat_map(move |tx| {
      (min_ty..=max_ty).map(move |ty| Tile {
        x: tx.rem_euclid(world_tiles) as u32,
        y: ty as u32,
        zoom,
      })
    });
    self.loader.prefetch(tiles);
  }

  /// Renders the view centered on `(lat, lon)` into a `width` x `height`
  /// character grid. Never fails; tiles that cannot be fetched or decoded
  /// simply stay blank.
  #[allow(
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
  )]
  pub fn render_ascii(
    &mut self,
    lat: f64,
    lon: f64,
    zoom: i32,
    width: usize,
    height: usize,
    cell_aspect: f64,
    show_street_names: bool,
  ) -> RenderResult {
    let width = width.clamp(MIN_WIDTH, MAX_WIDTH);
    let height = height.clamp(MIN_HEIGHT, MAX_HEIGHT);
    let cell_aspect = cell_aspect.clamp(MIN_CELL_ASPECT, MAX_CELL_ASPECT);

    let view = coordinates::normalize_view(lat, lon, zoom);
    let view_world_w = width as f64 * cell_aspect;
    let view_world_h = height as f64 * WORLD_PX_PER_CELL_Y;
    let viewport = Viewport {
      tl_wx: view.wx - view_world_w / 2.0,
      tl_wy: view.wy - view_world_h / 2.0,
      cell_aspect,
      width,
      height,
      zoom: view.zoom,
    };

    let mut fb = Framebuffer::new(width, height);
    let mut label_candidates: Vec<labels::LabelCandidate> = Vec::new();
    let collect_labels = show_street_names && view.zoom >= LABEL_MIN_ZOOM;

    let world_tiles = 1i64 << view.zoom;
    let min_tx = (viewport.tl_wx / TILE_SIZE).floor() as i64;
    let max_tx = ((viewport.tl_wx + view_world_w) / TILE_SIZE).floor() as i64;
    let min_ty = (viewport.tl_wy / TILE_SIZE).floor() as i64;
    let max_ty = ((viewport.tl_wy + view_world_h) / TILE_SIZE).floor() as i64;

    for tx in min_tx..=max_tx {
      for ty in min_ty..=max_ty {
        // X wraps around the antimeridian, Y does not wrap over the poles.
        if ty < 0 || ty >= world_tiles {
          continue;
        }
        let tile = Tile {
          x: tx.rem_euclid(world_tiles) as u32,
          y: ty as u32,
          zoom: view.zoom,
        };
        let tile_data = self.loader.get_decoded_tile(&tile);
        if tile_data.is_empty() {
          continue;
        }
        let painter = TilePainter { viewport, tx, ty };

        if view.zoom <= TERRAIN_FILL_MAX_ZOOM {
          draw_green_layer(&mut fb, tile_data, &painter);
          draw_polygon_layer(&mut fb, tile_data.get("water"), &painter, style::GLYPH_WATER, true);
        }
        draw_polygon_layer(&mut fb, tile_data.get("water"), &painter, style::GLYPH_WATER, false);
        draw_polygon_layer(
          &mut fb,
          tile_data.get("building"),
          &painter,
          style::GLYPH_BUILDING,
          false,
        );

        let road_layer = tile_data
          .get("road")
          .or_else(|| tile_data.get("transportation"));
        if let Some(layer) = road_layer {
          draw_line_layer(&mut fb, layer, &painter, style::road_glyph);
        }
        if let Some(layer) = tile_data.get("waterway") {
          draw_line_layer(&mut fb, layer, &painter, |_| Some(style::GLYPH_WATERWAY));
        }

        if collect_labels
          && let Some(layer) = tile_data.get("transportation_name")
        {
          labels::collect_candidates(layer, &painter, &mut label_candidates);
        }
      }
    }

    if collect_labels {
      labels::place_labels(&mut fb, &mut label_candidates);
    }
    fb.set_char(
      (width / 2) as i32,
      (height / 2) as i32,
      style::GLYPH_CENTER,
      0,
    );

    let text = (0..height).map(|y| fb.row(y)).collect::<Vec<_>>().join("\n");
    RenderResult {
      text,
      lat: view.lat,
      lon: view.lon,
      zoom: view.zoom,
      width,
      height,
      cell_aspect,
    }
  }
}

/// The polygons of a feature, treating a plain polygon as a one-element
/// multipolygon.
fn feature_polygons(geometry: &Geometry) -> &[Vec<Vec<TilePoint>>] {
  match geometry {
    Geometry::Polygon(rings) => std::slice::from_ref(rings),
    Geometry::MultiPolygon(polygons) => polygons,
    _ => &[],
  }
}

/// Projects a polygon's rings to screen space, dropping rings that
/// degenerate below three vertices.
fn screen_rings(
  polygon: &[Vec<TilePoint>],
  extent: u32,
  painter: &TilePainter,
) -> Vec<Vec<(i32, i32)>> {
  polygon
    .iter()
    .filter_map(|ring| {
      let simplified = simplify(ring, painter.viewport.zoom);
      let points: Vec<(i32, i32)> = simplified
        .iter()
        .map(|&point| painter.project(point, extent))
        .collect();
      (points.len() >= 3).then_some(points)
    })
    .collect()
}

fn draw_polygon_layer(
  fb: &mut Framebuffer,
  layer: Option<&Layer>,
  painter: &TilePainter,
  ch: char,
  filled: bool,
) {
  let Some(layer) = layer else { return };
  for feature in &layer.features {
    for polygon in feature_polygons(&feature.geometry) {
      let rings = screen_rings(polygon, layer.extent, painter);
      if rings.is_empty() {
        continue;
      }
      if filled {
        fb.draw_polygon_filled(&rings, ch, 0);
      } else {
        for ring in &rings {
          fb.draw_poly_outline(ring, ch, 0);
        }
      }
    }
  }
}

/// Fills landuse (or landcover) features whose class reads as greenery.
fn draw_green_layer(fb: &mut Framebuffer, tile_data: &DecodedTile, painter: &TilePainter) {
  let Some(layer) = tile_data
    .get("landuse")
    .or_else(|| tile_data.get("landcover"))
  else {
    return;
  };
  for feature in &layer.features {
    let class = feature
      .properties
      .get("class")
      .and_then(Value::as_str)
      .unwrap_or("");
    if !style::is_green_landuse(class) {
      continue;
    }
    for polygon in feature_polygons(&feature.geometry) {
      let rings = screen_rings(polygon, layer.extent, painter);
      if !rings.is_empty() {
        fb.draw_polygon_filled(&rings, style::GLYPH_GREEN, 0);
      }
    }
  }
}

fn draw_line_layer(
  fb: &mut Framebuffer,
  layer: &Layer,
  painter: &TilePainter,
  glyph_for: impl Fn(&str) -> Option<char>,
) {
  for feature in &layer.features {
    let class = feature
      .properties
      .get("class")
      .and_then(Value::as_str)
      .unwrap_or("");
    let Some(ch) = glyph_for(class) else { continue };

    let lines: &[Vec<TilePoint>] = match &feature.geometry {
      Geometry::LineString(line) => std::slice::from_ref(line),
      Geometry::MultiLineString(lines) => lines,
      _ => continue,
    };
    for line in lines {
      let simplified = simplify(line, painter.viewport.zoom);
      let points: Vec<(i32, i32)> = simplified
        .iter()
        .map(|&point| painter.project(point, layer.extent))
        .collect();
      if points.len() >= 2 {
        fb.draw_poly_outline(&points, ch, 0);
      }
    }
  }
}
