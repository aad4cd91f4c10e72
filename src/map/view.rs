use serde::{Deserialize, Serialize};

use super::coordinates::{normalize_view, world_pixel_to_latlon};

pub const DEFAULT_CELL_ASPECT: f64 = 0.6;
pub const DEFAULT_PAN_STEP_CELLS: f64 = 10.0;
/// One cell always covers exactly one world pixel vertically.
pub const WORLD_PX_PER_CELL_Y: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanDirection {
  Up,
  Down,
  Left,
  Right,
}

impl PanDirection {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      PanDirection::Up => "up",
      PanDirection::Down => "down",
      PanDirection::Left => "left",
      PanDirection::Right => "right",
    }
  }

  #[must_use]
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "up" => Some(PanDirection::Up),
      "down" => Some(PanDirection::Down),
      "left" => Some(PanDirection::Left),
      "right" => Some(PanDirection::Right),
      _ => None,
    }
  }
}

/// Moves the camera by `step_cells` cells. Horizontal steps scale with the
/// cell aspect so panning feels identical in both axes on screen. The
/// result wraps in longitude and clamps in latitude like any view.
#[must_use]
pub fn pan(
  lat: f64,
  lon: f64,
  zoom: i32,
  direction: PanDirection,
  step_cells: f64,
  cell_aspect: f64,
) -> (f64, f64) {
  let view = normalize_view(lat, lon, zoom);
  let move_x = step_cells * cell_aspect.max(0.2);
  let move_y = step_cells * WORLD_PX_PER_CELL_Y;

  let (mut wx, mut wy) = (view.wx, view.wy);
  match direction {
    PanDirection::Up => wy -= move_y,
    PanDirection::Down => wy += move_y,
    PanDirection::Left => wx -= move_x,
    PanDirection::Right => wx += move_x,
  }

  wx = wx.rem_euclid(view.world_size);
  wy = wy.clamp(0.0, view.world_size - 1.0);
  world_pixel_to_latlon(wx, wy, view.zoom)
}
