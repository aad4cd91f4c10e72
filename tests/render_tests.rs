//! End-to-end rendering tests against handcrafted vector tiles.

use std::sync::Arc;

use asciimap::map::coordinates::{self, TILE_SIZE};
use asciimap::map::renderer::MapRenderer;
use asciimap::map::tile_loader::{CachedTileLoader, TileData, TileFetcher};

/// Serves the same tile bytes for every requested tile.
struct StaticFetcher(Option<TileData>);

impl TileFetcher for StaticFetcher {
  fn fetch(&self, _tile: &asciimap::map::coordinates::Tile) -> Option<TileData> {
    self.0.clone()
  }
}

fn renderer_with(bytes: Option<TileData>) -> MapRenderer {
  MapRenderer::new(CachedTileLoader::new(Arc::new(StaticFetcher(bytes)), None))
}

fn lines(text: &str) -> Vec<&str> {
  text.split('\n').collect()
}

fn cell(text: &str, x: usize, y: usize) -> char {
  lines(text)[y].chars().nth(x).unwrap()
}

#[test]
fn empty_store_renders_blank_frame_with_center_marker() {
  let mut renderer = renderer_with(None);
  let result = renderer.render_ascii(43.6446, -79.3849, 13, 80, 24, 0.6, false);

  assert_eq!(result.zoom, 13);
  let rows = lines(&result.text);
  assert_eq!(rows.len(), 24);
  for (y, row) in rows.iter().enumerate() {
    assert_eq!(row.chars().count(), 80);
    for (x, ch) in row.chars().enumerate() {
      if (x, y) == (40, 12) {
        assert_eq!(ch, '@');
      } else {
        assert_eq!(ch, ' ', "unexpected glyph at ({x},{y})");
      }
    }
  }
}

#[test]
fn dimensions_are_clamped() {
  let mut renderer = renderer_with(None);
  let result = renderer.render_ascii(0.0, 0.0, 5, 5, 999, 0.01, false);
  assert_eq!(result.width, 20);
  assert_eq!(result.height, 140);
  assert!((result.cell_aspect - 0.2).abs() < 1e-9);
  assert_eq!(lines(&result.text).len(), 140);
  assert!(lines(&result.text).iter().all(|l| l.chars().count() == 20));
}

#[test]
fn diagonal_road_rasterizes_through_the_tile() {
  let bytes = mvt_fixtures::tile_with_line_layer(
    "transportation",
    "primary",
    &[(0, 0), (4096, 4096)],
  );
  let mut renderer = renderer_with(Some(bytes));
  // Zoom 0 and a square 24x24 window with cell aspect 1.0 make the
  // world-diagonal land exactly on the screen diagonal.
  let result = renderer.render_ascii(0.0, 0.0, 0, 24, 24, 1.0, false);

  for i in 0..24 {
    let expected = if i == 12 { '@' } else { '+' };
    assert_eq!(cell(&result.text, i, i), expected, "diagonal broken at {i}");
  }
}

#[test]
fn water_polygon_hole_stays_blank() {
  let outer: &[(i64, i64)] = &[(0, 0), (4096, 0), (4096, 4096), (0, 4096)];
  // Reversed winding makes this ring a hole spanning screen cells 6..=18.
  let hole: &[(i64, i64)] = &[(1952, 1952), (1952, 2144), (2144, 2144), (2144, 1952)];
  let bytes = mvt_fixtures::tile_with_polygon_layer("water", &[outer, hole]);
  let mut renderer = renderer_with(Some(bytes));
  let result = renderer.render_ascii(0.0, 0.0, 0, 24, 24, 1.0, false);

  assert_eq!(cell(&result.text, 10, 10), ' ');
  assert_eq!(cell(&result.text, 3, 10), '~');
  assert_eq!(cell(&result.text, 10, 3), '~');
  assert_eq!(cell(&result.text, 21, 10), '~');
}

#[test]
fn unnamed_road_classes_are_not_drawn() {
  let bytes =
    mvt_fixtures::tile_with_line_layer("transportation", "footway", &[(0, 0), (4096, 4096)]);
  let mut renderer = renderer_with(Some(bytes));
  let result = renderer.render_ascii(0.0, 0.0, 0, 24, 24, 1.0, false);
  for i in 0..24 {
    if i != 12 {
      assert_eq!(cell(&result.text, i, i), ' ');
    }
  }
}

fn tile_center_latlon(tx: u32, ty: u32, zoom: u8) -> (f64, f64) {
  coordinates::world_pixel_to_latlon(
    (f64::from(tx) + 0.5) * TILE_SIZE,
    (f64::from(ty) + 0.5) * TILE_SIZE,
    zoom,
  )
}

#[test]
fn street_name_places_once_despite_three_candidates() {
  // Three lines sharing one name, with middle vertices on three rows.
  let lines_at = |y: i64| vec![(1024, y), (2048, y), (3072, y)];
  let bytes = mvt_fixtures::tile_with_name_layer(
    "Main Street",
    "primary",
    &[&lines_at(1920), &lines_at(2048), &lines_at(2176)],
  );
  let (lat, lon) = tile_center_latlon(2301, 2999, 13);

  let mut renderer = renderer_with(Some(bytes));
  let result = renderer.render_ascii(lat, lon, 13, 80, 24, 0.6, true);
  assert_eq!(result.text.matches("Main Street").count(), 1);
}

#[test]
fn no_labels_below_minimum_zoom() {
  let line = [(1024i64, 2176), (2048, 2176), (3072, 2176)];
  let bytes = mvt_fixtures::tile_with_name_layer("Main Street", "primary", &[&line]);
  let (lat, lon) = tile_center_latlon(575, 749, 12);

  let mut renderer = renderer_with(Some(bytes));
  let result = renderer.render_ascii(lat, lon, 12, 80, 24, 0.6, true);
  assert_eq!(result.text.matches("Main Street").count(), 0);
}

#[test]
fn street_names_are_skipped_when_disabled() {
  let line = [(1024i64, 2176), (2048, 2176), (3072, 2176)];
  let bytes = mvt_fixtures::tile_with_name_layer("Main Street", "primary", &[&line]);
  let (lat, lon) = tile_center_latlon(2301, 2999, 13);

  let mut renderer = renderer_with(Some(bytes));
  let result = renderer.render_ascii(lat, lon, 13, 80, 24, 0.6, false);
  assert_eq!(result.text.matches("Main Street").count(), 0);
}

#[test]
fn result_echoes_the_normalized_view() {
  let mut renderer = renderer_with(None);
  let result = renderer.render_ascii(100.0, 200.0, 20, 80, 24, 0.6, false);
  assert_eq!(result.zoom, 14);
  assert!((result.lon - -160.0).abs() < 1e-6);
  assert!(result.lat > 85.0);
}

/// Just enough protobuf encoding to build MVT fixtures.
mod mvt_fixtures {
  fn varint(mut v: u64, out: &mut Vec<u8>) {
    loop {
      let byte = (v & 0x7f) as u8;
      v >>= 7;
      if v == 0 {
        out.push(byte);
        break;
      }
      out.push(byte | 0x80);
    }
  }

  fn field_bytes(field: u64, payload: &[u8], out: &mut Vec<u8>) {
    varint(field << 3 | 2, out);
    varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
  }

  fn field_varint(field: u64, v: u64, out: &mut Vec<u8>) {
    varint(field << 3, out);
    varint(v, out);
  }

  fn packed(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in values {
      varint(v, &mut out);
    }
    out
  }

  #[allow(clippy::cast_sign_loss)]
  fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
  }

  fn line_commands(points: &[(i64, i64)], commands: &mut Vec<u64>) {
    commands.push(9);
    commands.push(zigzag_encode(points[0].0));
    commands.push(zigzag_encode(points[0].1));
    commands.push(((points.len() as u64 - 1) << 3) | 2);
    let mut prev = points[0];
    for &p in &points[1..] {
      commands.push(zigzag_encode(p.0 - prev.0));
      commands.push(zigzag_encode(p.1 - prev.1));
      prev = p;
    }
  }

  fn string_value(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    field_bytes(1, s.as_bytes(), &mut out);
    out
  }

  fn feature(geom_type: u64, tags: &[u64], commands: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    field_bytes(2, &packed(tags), &mut out);
    field_varint(3, geom_type, &mut out);
    field_bytes(4, &packed(commands), &mut out);
    out
  }

  fn layer(name: &str, keys: &[&str], values: &[Vec<u8>], features: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    field_varint(15, 2, &mut out);
    field_bytes(1, name.as_bytes(), &mut out);
    for f in features {
      field_bytes(2, f, &mut out);
    }
    for key in keys {
      field_bytes(3, key.as_bytes(), &mut out);
    }
    for value in values {
      field_bytes(4, value, &mut out);
    }
    field_varint(5, 4096, &mut out);
    out
  }

  fn tile(layers: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for l in layers {
      field_bytes(3, l, &mut out);
    }
    out
  }

  /// A tile with one linestring feature carrying a `class` property.
  pub fn tile_with_line_layer(layer_name: &str, class: &str, points: &[(i64, i64)]) -> Vec<u8> {
    let mut commands = Vec::new();
    line_commands(points, &mut commands);
    let f = feature(2, &[0, 0], &commands);
    tile(&[layer(layer_name, &["class"], &[string_value(class)], &[f])])
  }

  /// A tile with one polygon feature built from the given open rings.
  pub fn tile_with_polygon_layer(layer_name: &str, rings: &[&[(i64, i64)]]) -> Vec<u8> {
    let mut commands = Vec::new();
    let mut cursor = (0i64, 0i64);
    for ring in rings {
      commands.push(9);
      commands.push(zigzag_encode(ring[0].0 - cursor.0));
      commands.push(zigzag_encode(ring[0].1 - cursor.1));
      cursor = ring[0];
      commands.push(((ring.len() as u64 - 1) << 3) | 2);
      for &p in &ring[1..] {
        commands.push(zigzag_encode(p.0 - cursor.0));
        commands.push(zigzag_encode(p.1 - cursor.1));
        cursor = p;
      }
      commands.push(15);
    }
    let f = feature(3, &[], &commands);
    tile(&[layer(layer_name, &[], &[], &[f])])
  }

  /// A `transportation_name` tile whose lines all share one street name.
  pub fn tile_with_name_layer(name: &str, class: &str, line_list: &[&[(i64, i64)]]) -> Vec<u8> {
    let features: Vec<Vec<u8>> = line_list
      .iter()
      .map(|points| {
        let mut commands = Vec::new();
        line_commands(points, &mut commands);
        feature(2, &[0, 0, 1, 1], &commands)
      })
      .collect();
    tile(&[layer(
      "transportation_name",
      &["class", "name"],
      &[string_value(class), string_value(name)],
      &features,
    )])
  }
}
