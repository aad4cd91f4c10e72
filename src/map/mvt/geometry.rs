//! Decodes MVT geometry command streams into geometry variants.

use super::{DecodeError, wire};

/// A vertex in tile-local integer coordinates, `[0, extent]`, y down.
pub type TilePoint = (i64, i64);

/// Decoded feature geometry. Polygon rings are ordered exterior first,
/// holes after.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Geometry {
  Point(TilePoint),
  MultiPoint(Vec<TilePoint>),
  LineString(Vec<TilePoint>),
  MultiLineString(Vec<Vec<TilePoint>>),
  Polygon(Vec<Vec<TilePoint>>),
  MultiPolygon(Vec<Vec<Vec<TilePoint>>>),
  #[default]
  Unknown,
}

/// Geometry type enum of the Feature message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GeomType {
  Point,
  LineString,
  Polygon,
  Unknown,
}

impl From<u64> for GeomType {
  fn from(value: u64) -> Self {
    match value {
      1 => GeomType::Point,
      2 => GeomType::LineString,
      3 => GeomType::Polygon,
      _ => GeomType::Unknown,
    }
  }
}

const CMD_MOVE_TO: u64 = 1;
const CMD_LINE_TO: u64 = 2;
const CMD_CLOSE_PATH: u64 = 7;

/// Signed area of a ring, shoelace formula. Positive for clockwise rings
/// in y-down screen orientation, which MVT uses for exterior rings.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn signed_area(ring: &[TilePoint]) -> f64 {
  let n = ring.len();
  let mut doubled = 0i64;
  for i in 0..n {
    let j = (i + 1) % n;
    doubled += ring[i].0 * ring[j].1 - ring[j].0 * ring[i].1;
  }
  doubled as f64 / 2.0
}

pub(super) fn decode(
  data: &[u8],
  geom_type: GeomType,
  extent: u32,
  y_coord_down: bool,
) -> Result<Geometry, DecodeError> {
  let commands = wire::decode_packed_varints(data)?;
  let mut idx = 0;
  let (mut cx, mut cy) = (0i64, 0i64);
  let mut rings: Vec<Vec<TilePoint>> = Vec::new();
  let mut current: Vec<TilePoint> = Vec::new();

  while idx < commands.len() {
    let cmd = commands[idx];
    idx += 1;
    let cmd_id = cmd & 0x07;
    let count = cmd >> 3;

    match cmd_id {
      CMD_MOVE_TO => {
        for _ in 0..count {
          if idx + 1 >= commands.len() {
            break;
          }
          cx += wire::zigzag(commands[idx]);
          cy += wire::zigzag(commands[idx + 1]);
          idx += 2;
          // Each MoveTo pair starts a new ring.
          if !current.is_empty() {
            rings.push(std::mem::take(&mut current));
          }
          current.push((cx, cy));
        }
      }
      CMD_LINE_TO => {
        for _ in 0..count {
          if idx + 1 >= commands.len() {
            break;
          }
          cx += wire::zigzag(commands[idx]);
          cy += wire::zigzag(commands[idx + 1]);
          idx += 2;
          current.push((cx, cy));
        }
      }
      CMD_CLOSE_PATH => {
        if current.len() >= 2 {
          current.push(current[0]);
        }
        if !current.is_empty() {
          rings.push(std::mem::take(&mut current));
        }
      }
      _ => {}
    }
  }
  if !current.is_empty() {
    rings.push(current);
  }

  if !y_coord_down {
    let extent = i64::from(extent);
    for ring in &mut rings {
      for point in ring {
        point.1 = extent - point.1;
      }
    }
  }

  Ok(assemble(rings, geom_type))
}

fn assemble(mut rings: Vec<Vec<TilePoint>>, geom_type: GeomType) -> Geometry {
  match geom_type {
    GeomType::Point => {
      let mut points: Vec<TilePoint> = rings.into_iter().flatten().collect();
      if points.len() == 1 {
        Geometry::Point(points.remove(0))
      } else {
        Geometry::MultiPoint(points)
      }
    }
    GeomType::LineString => {
      if rings.len() == 1 {
        Geometry::LineString(rings.remove(0))
      } else {
        Geometry::MultiLineString(rings)
      }
    }
    GeomType::Polygon => {
      // Group rings into polygons: a non-negative signed area opens a new
      // exterior, a negative one is a hole of the polygon currently open.
      let mut polygons: Vec<Vec<Vec<TilePoint>>> = Vec::new();
      let mut open: Option<Vec<Vec<TilePoint>>> = None;
      for ring in rings {
        if signed_area(&ring) >= 0.0 {
          if let Some(polygon) = open.take() {
            polygons.push(polygon);
          }
          open = Some(vec![ring]);
        } else if let Some(polygon) = &mut open {
          polygon.push(ring);
        } else {
          open = Some(vec![ring]);
        }
      }
      if let Some(polygon) = open {
        polygons.push(polygon);
      }
      if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
      } else {
        Geometry::MultiPolygon(polygons)
      }
    }
    GeomType::Unknown => Geometry::Unknown,
  }
}
