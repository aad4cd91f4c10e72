//! Lightweight Mapbox Vector Tile decoder.
//!
//! Parses the protobuf wire format directly instead of going through a
//! schema compiler; a tile is small and the MVT schema is stable. Only
//! decoding is implemented.

mod geometry;
mod wire;

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

pub use geometry::{Geometry, TilePoint, signed_area};
use geometry::GeomType;
use wire::{MessageReader, WireValue};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
  #[error("truncated varint")]
  TruncatedVarint,
  #[error("field extends past the end of the buffer")]
  TruncatedField,
}

/// All layers of a tile, keyed by layer name.
pub type DecodedTile = HashMap<String, Layer>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
  /// Tile-local coordinate range, `[0, extent]`.
  pub extent: u32,
  pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
  pub geometry: Geometry,
  pub properties: HashMap<String, Value>,
}

/// A property value of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  String(String),
  Float(f32),
  Double(f64),
  Int(i64),
  UInt(u64),
  SInt(i64),
  Bool(bool),
}

impl Value {
  #[must_use]
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }
}

// Field numbers from the MVT protobuf schema.
const TILE_LAYER: u64 = 3;

const LAYER_NAME: u64 = 1;
const LAYER_FEATURE: u64 = 2;
const LAYER_KEY: u64 = 3;
const LAYER_VALUE: u64 = 4;
const LAYER_EXTENT: u64 = 5;

const FEATURE_TAGS: u64 = 2;
const FEATURE_TYPE: u64 = 3;
const FEATURE_GEOMETRY: u64 = 4;

const VALUE_STRING: u64 = 1;
const VALUE_FLOAT: u64 = 2;
const VALUE_DOUBLE: u64 = 3;
const VALUE_INT: u64 = 4;
const VALUE_UINT: u64 = 5;
const VALUE_SINT: u64 = 6;
const VALUE_BOOL: u64 = 7;

const DEFAULT_EXTENT: u32 = 4096;

/// Decodes tile bytes into a map of layers.
///
/// Never fails: a truncated or otherwise malformed buffer decodes to an
/// empty map, and malformed features are dropped without taking their
/// layer down with them.
#[must_use]
pub fn decode(tile_bytes: &[u8], y_coord_down: bool) -> DecodedTile {
  decode_tile(tile_bytes, y_coord_down).unwrap_or_else(|e| {
    debug!("discarding malformed tile: {e}");
    DecodedTile::default()
  })
}

fn decode_tile(buf: &[u8], y_coord_down: bool) -> Result<DecodedTile, DecodeError> {
  let mut layers = DecodedTile::new();
  let mut reader = MessageReader::new(buf);
  while let Some((field, value)) = reader.next_field()? {
    if field == TILE_LAYER
      && let WireValue::Bytes(data) = value
    {
      let (name, layer) = decode_layer(data, y_coord_down)?;
      if !name.is_empty() {
        layers.insert(name, layer);
      }
    }
  }
  Ok(layers)
}

fn decode_layer(buf: &[u8], y_coord_down: bool) -> Result<(String, Layer), DecodeError> {
  let mut name = String::new();
  let mut keys: Vec<String> = Vec::new();
  let mut values: Vec<Option<Value>> = Vec::new();
  let mut extent = DEFAULT_EXTENT;
  let mut feature_datas: Vec<&[u8]> = Vec::new();

  let mut reader = MessageReader::new(buf);
  while let Some((field, value)) = reader.next_field()? {
    match (field, value) {
      (LAYER_NAME, WireValue::Bytes(b)) => name = String::from_utf8_lossy(b).into_owned(),
      (LAYER_KEY, WireValue::Bytes(b)) => keys.push(String::from_utf8_lossy(b).into_owned()),
      (LAYER_VALUE, WireValue::Bytes(b)) => values.push(decode_value(b)?),
      (LAYER_EXTENT, WireValue::Varint(v)) => {
        extent = u32::try_from(v).unwrap_or(DEFAULT_EXTENT);
      }
      (LAYER_FEATURE, WireValue::Bytes(b)) => feature_datas.push(b),
      // Version and anything else the schema may grow are irrelevant here.
      _ => {}
    }
  }

  // Features reference keys/values by index, so they decode last.
  let mut features = Vec::with_capacity(feature_datas.len());
  for data in feature_datas {
    match decode_feature(data, &keys, &values, extent, y_coord_down) {
      Ok(feature) => features.push(feature),
      Err(e) => debug!("skipping malformed feature in layer {name}: {e}"),
    }
  }

  Ok((name, Layer { extent, features }))
}

/// Decodes a Value message: the first recognized field wins.
fn decode_value(buf: &[u8]) -> Result<Option<Value>, DecodeError> {
  let mut reader = MessageReader::new(buf);
  while let Some((field, value)) = reader.next_field()? {
    let decoded = match (field, value) {
      (VALUE_STRING, WireValue::Bytes(b)) => {
        Value::String(String::from_utf8_lossy(b).into_owned())
      }
      (VALUE_FLOAT, WireValue::Fixed32(b)) => Value::Float(f32::from_le_bytes(b)),
      (VALUE_DOUBLE, WireValue::Fixed64(b)) => Value::Double(f64::from_le_bytes(b)),
      #[allow(clippy::cast_possible_wrap)]
      (VALUE_INT, WireValue::Varint(v)) => Value::Int(v as i64),
      (VALUE_UINT, WireValue::Varint(v)) => Value::UInt(v),
      (VALUE_SINT, WireValue::Varint(v)) => Value::SInt(wire::zigzag(v)),
      (VALUE_BOOL, WireValue::Varint(v)) => Value::Bool(v != 0),
      _ => continue,
    };
    return Ok(Some(decoded));
  }
  Ok(None)
}

fn decode_feature(
  buf: &[u8],
  keys: &[String],
  values: &[Option<Value>],
  extent: u32,
  y_coord_down: bool,
) -> Result<Feature, DecodeError> {
  let mut geom_type = GeomType::Point;
  let mut geom_data: &[u8] = &[];
  let mut tags_raw: &[u8] = &[];

  let mut reader = MessageReader::new(buf);
  while let Some((field, value)) = reader.next_field()? {
    match (field, value) {
      (FEATURE_TYPE, WireValue::Varint(v)) => geom_type = GeomType::from(v),
      (FEATURE_GEOMETRY, WireValue::Bytes(b)) => geom_data = b,
      (FEATURE_TAGS, WireValue::Bytes(b)) => tags_raw = b,
      _ => {}
    }
  }

  // Tags alternate key index, value index; out-of-range indices are skipped.
  let mut properties = HashMap::new();
  let tag_indices = wire::decode_packed_varints(tags_raw)?;
  for pair in tag_indices.chunks_exact(2) {
    let (ki, vi) = (
      usize::try_from(pair[0]).unwrap_or(usize::MAX),
      usize::try_from(pair[1]).unwrap_or(usize::MAX),
    );
    if let (Some(key), Some(Some(value))) = (keys.get(ki), values.get(vi)) {
      properties.insert(key.clone(), value.clone());
    }
  }

  let geometry = geometry::decode(geom_data, geom_type, extent, y_coord_down)?;
  Ok(Feature {
    geometry,
    properties,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::map::mvt::test_bytes::{self, TestFeature, TestLayer, TestValue};

  #[test]
  fn empty_buffer_is_an_empty_tile() {
    assert!(decode(&[], true).is_empty());
  }

  #[test]
  fn garbage_decodes_to_an_empty_tile() {
    // A length-delimited layer field that claims more bytes than exist.
    assert!(decode(&[0x1a, 0x7f, 0x00], true).is_empty());
  }

  #[test]
  fn decodes_a_linestring_feature_with_properties() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "transportation",
      extent: 4096,
      keys: &["class"],
      values: &[TestValue::Str("primary")],
      features: &[TestFeature {
        geom_type: 2,
        tags: &[0, 0],
        commands: &test_bytes::line_commands(&[(0, 0), (4096, 4096)]),
      }],
    }]);

    let tile = decode(&bytes, true);
    let layer = &tile["transportation"];
    assert_eq!(layer.extent, 4096);
    assert_eq!(layer.features.len(), 1);
    let feature = &layer.features[0];
    assert_eq!(
      feature.properties.get("class").and_then(Value::as_str),
      Some("primary")
    );
    assert_eq!(
      feature.geometry,
      Geometry::LineString(vec![(0, 0), (4096, 4096)])
    );
  }

  #[test]
  fn extent_defaults_to_4096() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "water",
      extent: 0,
      keys: &[],
      values: &[],
      features: &[],
    }]);
    assert_eq!(decode(&bytes, true)["water"].extent, 4096);
  }

  #[test]
  fn value_variants_round_trip() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "poi",
      extent: 4096,
      keys: &["name", "rank", "height", "open"],
      values: &[
        TestValue::Str("dock"),
        TestValue::UInt(7),
        TestValue::Double(12.5),
        TestValue::Bool(true),
      ],
      features: &[TestFeature {
        geom_type: 1,
        tags: &[0, 0, 1, 1, 2, 2, 3, 3],
        commands: &test_bytes::point_commands(10, 20),
      }],
    }]);

    let tile = decode(&bytes, true);
    let props = &tile["poi"].features[0].properties;
    assert_eq!(props["name"], Value::String("dock".to_string()));
    assert_eq!(props["rank"], Value::UInt(7));
    assert_eq!(props["height"], Value::Double(12.5));
    assert_eq!(props["open"], Value::Bool(true));
  }

  #[test]
  fn out_of_range_tag_indices_are_skipped() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "poi",
      extent: 4096,
      keys: &["name"],
      values: &[TestValue::Str("dock")],
      features: &[TestFeature {
        geom_type: 1,
        tags: &[0, 9, 4, 0, 0, 0],
        commands: &test_bytes::point_commands(1, 1),
      }],
    }]);

    let props = &decode(&bytes, true)["poi"].features[0].properties;
    assert_eq!(props.len(), 1);
    assert_eq!(props["name"], Value::String("dock".to_string()));
  }

  #[test]
  fn malformed_feature_does_not_abort_the_layer() {
    let good = TestFeature {
      geom_type: 1,
      tags: &[],
      commands: &test_bytes::point_commands(5, 5),
    };
    let mut bytes = test_bytes::layer_with_raw_feature(
      "poi",
      &good,
      // Geometry payload ending inside a varint.
      &[0x22, 0x01, 0x80],
    );
    bytes = test_bytes::wrap_tile(&bytes);

    let tile = decode(&bytes, true);
    assert_eq!(tile["poi"].features.len(), 1);
  }

  #[test]
  fn y_flip_respects_layer_extent() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "poi",
      extent: 512,
      keys: &[],
      values: &[],
      features: &[TestFeature {
        geom_type: 1,
        tags: &[],
        commands: &test_bytes::point_commands(100, 30),
      }],
    }]);

    let tile = decode(&bytes, false);
    assert_eq!(
      tile["poi"].features[0].geometry,
      Geometry::Point((100, 482))
    );
  }

  #[test]
  fn nameless_layer_is_dropped() {
    let bytes = test_bytes::tile(&[TestLayer {
      name: "",
      extent: 4096,
      keys: &[],
      values: &[],
      features: &[],
    }]);
    assert!(decode(&bytes, true).is_empty());
  }
}
