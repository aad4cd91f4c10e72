//! Browser viewer: serves an HTML shell and a JSON render endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
  Json, Router,
  extract::{Query, State},
  response::Html,
  routing::get,
};
use serde::Deserialize;
use tower_http::trace::{self, TraceLayer};

use crate::map::coordinates::{MAX_ZOOM, MIN_ZOOM};
use crate::map::renderer::{MapRenderer, RenderResult};
use crate::map::view::{self, DEFAULT_CELL_ASPECT, DEFAULT_PAN_STEP_CELLS, PanDirection};

pub const DEFAULT_PORT: u16 = 8000;

pub const START_LAT: f64 = 43.6446;
pub const START_LON: f64 = -79.3849;
pub const START_ZOOM: i32 = 13;
const START_WIDTH: usize = 180;
const START_HEIGHT: usize = 60;

static PAGE: &str = include_str!("../assets/viewer.html");

pub type SharedRenderer = Arc<Mutex<MapRenderer>>;

/// Query parameters of `/api/render`. Everything is optional; missing
/// values fall back to the start view.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  pub zoom: Option<i32>,
  pub width: Option<usize>,
  pub height: Option<usize>,
  pub cell_aspect: Option<f64>,
  pub action: Option<String>,
}

/// The view after applying the query's `action` to its view state.
#[must_use]
pub fn apply_action(query: &RenderQuery) -> (f64, f64, i32) {
  let mut lat = query.lat.unwrap_or(START_LAT);
  let mut lon = query.lon.unwrap_or(START_LON);
  let mut zoom = query
    .zoom
    .unwrap_or(START_ZOOM)
    .clamp(i32::from(MIN_ZOOM), i32::from(MAX_ZOOM));
  let cell_aspect = query.cell_aspect.unwrap_or(DEFAULT_CELL_ASPECT);

  match query.action.as_deref().unwrap_or("") {
    "reset" => {
      lat = START_LAT;
      lon = START_LON;
      zoom = START_ZOOM;
    }
    "zoom_in" => zoom = (zoom + 1).min(i32::from(MAX_ZOOM)),
    "zoom_out" => zoom = (zoom - 1).max(i32::from(MIN_ZOOM)),
    action => {
      if let Some(direction) = PanDirection::from_name(action) {
        (lat, lon) = view::pan(lat, lon, zoom, direction, DEFAULT_PAN_STEP_CELLS, cell_aspect);
      }
    }
  }
  (lat, lon, zoom)
}

async fn index() -> Html<&'static str> {
  Html(PAGE)
}

async fn healthcheck() {}

async fn api_render(
  State(renderer): State<SharedRenderer>,
  Query(query): Query<RenderQuery>,
) -> Json<RenderResult> {
  let (lat, lon, zoom) = apply_action(&query);
  let width = query.width.unwrap_or(START_WIDTH);
  let height = query.height.unwrap_or(START_HEIGHT);
  let cell_aspect = query.cell_aspect.unwrap_or(DEFAULT_CELL_ASPECT);

  // Rendering blocks on tile fetches, so it leaves the async runtime.
  let result = tokio::task::spawn_blocking(move || {
    let mut renderer = renderer.lock().unwrap();
    let result = renderer.render_ascii(lat, lon, zoom, width, height, cell_aspect, false);
    renderer.prefetch_neighbors(&result);
    result
  })
  .await
  .expect("render task panicked");
  Json(result)
}

#[must_use]
pub fn router(renderer: SharedRenderer) -> Router {
  Router::new()
    .route("/", get(index))
    .route("/api/render", get(api_render))
    .route("/healthcheck", get(healthcheck))
    .with_state(renderer)
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    )
}

/// Runs the viewer until the process is stopped.
///
/// # Errors
///
/// Fails when the port cannot be bound.
pub async fn serve(port: u16, renderer: SharedRenderer) -> anyhow::Result<()> {
  let app = router(renderer);
  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  let listener = tokio::net::TcpListener::bind(addr).await?;
  log::info!("ASCII map viewer running at http://{addr}");
  axum::serve(listener, app).await?;
  Ok(())
}
