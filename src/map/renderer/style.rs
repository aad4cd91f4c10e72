//! Glyph and feature-class styling for the ASCII pipeline.

pub const GLYPH_GREEN: char = '\'';
pub const GLYPH_WATER: char = '~';
pub const GLYPH_WATERWAY: char = '|';
pub const GLYPH_BUILDING: char = '#';
pub const GLYPH_CENTER: char = '@';

/// One-line legend for UIs to print next to the map.
pub const GLYPH_LEGEND: &str =
  "' green  ~ water  | waterway  # bldg  =-+;:.%x,` roads  @ center";

/// Glyph for a road feature class; unknown classes are not drawn.
#[must_use]
pub fn road_glyph(class: &str) -> Option<char> {
  match class {
    "motorway" => Some('='),
    "trunk" => Some('-'),
    "primary" => Some('+'),
    "secondary" => Some(';'),
    "tertiary" => Some(':'),
    "minor" | "street" | "residential" => Some('.'),
    "bridge" => Some('%'),
    "rail" => Some('x'),
    "service" => Some(','),
    "path" => Some('`'),
    _ => None,
  }
}

/// Landuse/landcover classes rendered as greenery.
#[must_use]
pub fn is_green_landuse(class: &str) -> bool {
  matches!(
    class,
    "allotments"
      | "cemetery"
      | "farmland"
      | "forest"
      | "garden"
      | "grass"
      | "meadow"
      | "nature_reserve"
      | "orchard"
      | "park"
      | "pitch"
      | "recreation_ground"
      | "village_green"
      | "wood"
  )
}

/// Labeling priority of a road class, lower is more important. Classes
/// without a priority are never labeled.
#[must_use]
pub fn road_label_priority(class: &str) -> Option<u8> {
  match class {
    "motorway" => Some(0),
    "trunk" => Some(1),
    "primary" => Some(2),
    "secondary" => Some(3),
    "tertiary" => Some(4),
    "minor" => Some(5),
    "service" | "residential" => Some(6),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn road_glyphs() {
    assert_eq!(road_glyph("motorway"), Some('='));
    assert_eq!(road_glyph("residential"), Some('.'));
    assert_eq!(road_glyph("path"), Some('`'));
    assert_eq!(road_glyph("unknown"), None);
    assert_eq!(road_glyph(""), None);
  }

  #[test]
  fn green_classes() {
    assert!(is_green_landuse("park"));
    assert!(is_green_landuse("wood"));
    assert!(!is_green_landuse("industrial"));
  }

  #[test]
  fn label_priorities_are_ordered() {
    assert!(road_label_priority("motorway") < road_label_priority("trunk"));
    assert_eq!(road_label_priority("residential"), Some(6));
    assert_eq!(road_label_priority("footway"), None);
  }
}
