//! Street-name labels: candidate collection and collision-free placement.

use std::collections::HashSet;

use itertools::Itertools;

use super::style;
use super::{TilePainter, simplify};
use crate::map::framebuffer::Framebuffer;
use crate::map::mvt::{Geometry, Layer, Value};

/// Below this zoom no labels are placed at all.
pub const LABEL_MIN_ZOOM: u8 = 13;
pub const MAX_LABEL_CANDIDATES: usize = 600;
pub const MAX_LABEL_LEN: usize = 26;

/// A label anchored to the screen position of a road's middle vertex.
#[derive(Debug, Clone)]
pub(super) struct LabelCandidate {
  pub priority: u8,
  pub sy: i32,
  pub sx: i32,
  pub text: String,
}

/// Collapses whitespace, strips non-ASCII and caps the length.
pub(super) fn normalize_text(raw: &str) -> String {
  let text: String = raw.split_whitespace().join(" ");
  let text: String = text.chars().filter(char::is_ascii).collect();
  if text.len() > MAX_LABEL_LEN {
    format!("{}...", &text[..MAX_LABEL_LEN - 3])
  } else {
    text
  }
}

/// Gathers label candidates from a tile's `transportation_name` layer.
/// Stops once the global candidate cap is reached.
pub(super) fn collect_candidates(
  layer: &Layer,
  painter: &TilePainter,
  candidates: &mut Vec<LabelCandidate>,
) {
  if layer.extent == 0 {
    return;
  }

  for feature in &layer.features {
    let Some(priority) = feature
      .properties
      .get("class")
      .and_then(Value::as_str)
      .and_then(style::road_label_priority)
    else {
      continue;
    };

    let Some(raw) = feature
      .properties
      .get("name_en")
      .and_then(Value::as_str)
      .filter(|s| !s.is_empty())
      .or_else(|| feature.properties.get("name").and_then(Value::as_str))
    else {
      continue;
    };
    let text = normalize_text(raw);
    if text.is_empty() {
      continue;
    }

    let lines: &[Vec<_>] = match &feature.geometry {
      Geometry::LineString(line) => std::slice::from_ref(line),
      Geometry::MultiLineString(lines) => lines,
      _ => continue,
    };

    for line in lines {
      if line.len() < 2 {
        continue;
      }
      let simplified = simplify(line, painter.viewport.zoom);
      let Some(&mid) = simplified.get(simplified.len() / 2) else {
        continue;
      };
      let (sx, sy) = painter.project(mid, layer.extent);
      if !painter.viewport.contains(sx, sy) {
        continue;
      }
      candidates.push(LabelCandidate {
        priority,
        sy,
        sx,
        text: text.clone(),
      });
      if candidates.len() >= MAX_LABEL_CANDIDATES {
        return;
      }
    }
  }
}

/// Stamps labels into the framebuffer, most important first, skipping any
/// candidate whose padded bounding box touches an already placed label and
/// any street name placed before.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub(super) fn place_labels(fb: &mut Framebuffer, candidates: &mut [LabelCandidate]) {
  if candidates.is_empty() {
    return;
  }
  let width = fb.width() as i32;
  let height = fb.height() as i32;
  let max_labels = (width / 4 + height / 3).clamp(10, 48) as usize;
  let mut occupied = vec![false; (width * height) as usize];
  let mut placed_names: HashSet<String> = HashSet::new();
  let mut placed = 0usize;

  candidates.sort_by_key(|c| (c.priority, c.sy, c.sx));

  for candidate in &*candidates {
    if placed_names.contains(&candidate.text) {
      continue;
    }
    let len = candidate.text.len() as i32;
    let y = candidate.sy;
    let start_x = candidate.sx - len / 2;
    let end_x = start_x + len - 1;
    if start_x < 1 || end_x >= width - 1 || y < 1 || y >= height - 1 {
      continue;
    }

    let y_range = (y - 1).max(0)..=(y + 1).min(height - 1);
    let x_range = (start_x - 1).max(0)..=(end_x + 1).min(width - 1);
    let blocked = y_range
      .clone()
      .any(|oy| x_range.clone().any(|ox| occupied[(oy * width + ox) as usize]));
    if blocked {
      continue;
    }

    for (i, ch) in candidate.text.chars().enumerate() {
      fb.set_char(start_x + i as i32, y, ch, 0);
    }
    // Breathing room so labels never visually touch the geometry beside them.
    if start_x - 1 >= 0 {
      fb.set_char(start_x - 1, y, ' ', 0);
    }
    if end_x + 1 < width {
      fb.set_char(end_x + 1, y, ' ', 0);
    }
    for oy in y_range {
      for ox in x_range.clone() {
        occupied[(oy * width + ox) as usize] = true;
      }
    }
    placed_names.insert(candidate.text.clone());
    placed += 1;
    if placed >= max_labels {
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_collapses_whitespace_and_strips_non_ascii() {
    assert_eq!(normalize_text("  Queen   St  W "), "Queen St W");
    assert_eq!(normalize_text("Café Straße"), "Caf Strae");
    assert_eq!(normalize_text("…"), "");
  }

  #[test]
  fn normalize_truncates_long_names() {
    let text = normalize_text("An Extremely Long Street Name Indeed");
    assert_eq!(text.len(), MAX_LABEL_LEN);
    assert!(text.ends_with("..."));
  }

  fn candidate(priority: u8, sx: i32, sy: i32, text: &str) -> LabelCandidate {
    LabelCandidate {
      priority,
      sy,
      sx,
      text: text.to_string(),
    }
  }

  #[test]
  fn duplicate_names_place_once() {
    let mut fb = Framebuffer::new(40, 12);
    let mut candidates = vec![
      candidate(2, 10, 3, "Main St"),
      candidate(2, 10, 6, "Main St"),
      candidate(2, 20, 9, "Main St"),
    ];
    place_labels(&mut fb, &mut candidates);
    let text: String = (0..12).map(|y| fb.row(y)).collect();
    assert_eq!(text.matches("Main St").count(), 1);
  }

  #[test]
  fn overlapping_labels_are_rejected() {
    let mut fb = Framebuffer::new(40, 12);
    let mut candidates = vec![
      candidate(0, 10, 5, "First Ave"),
      candidate(1, 11, 5, "Second Ave"),
    ];
    place_labels(&mut fb, &mut candidates);
    let text: String = (0..12).map(|y| fb.row(y)).collect();
    assert_eq!(text.matches("First Ave").count(), 1);
    assert_eq!(text.matches("Second Ave").count(), 0);
  }

  #[test]
  fn border_touching_labels_are_rejected() {
    let mut fb = Framebuffer::new(20, 10);
    let mut candidates = vec![
      candidate(0, 1, 5, "Long Street Name"),
      candidate(0, 10, 0, "Top Road"),
      candidate(0, 10, 9, "Bottom Road"),
    ];
    place_labels(&mut fb, &mut candidates);
    let text: String = (0..10).map(|y| fb.row(y)).collect();
    assert!(!text.contains("Long Street Name"));
    assert!(!text.contains("Top Road"));
    assert!(!text.contains("Bottom Road"));
  }

  #[test]
  fn higher_priority_wins_placement_order() {
    let mut fb = Framebuffer::new(40, 12);
    let mut candidates = vec![
      candidate(5, 10, 5, "Side St"),
      candidate(0, 12, 5, "Motorway"),
    ];
    place_labels(&mut fb, &mut candidates);
    let text: String = (0..12).map(|y| fb.row(y)).collect();
    assert_eq!(text.matches("Motorway").count(), 1);
    assert_eq!(text.matches("Side St").count(), 0);
  }
}
