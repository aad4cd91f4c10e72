use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use asciimap::config::Config;
use asciimap::map::renderer::{MapRenderer, style};
use asciimap::map::tile_loader::CachedTileLoader;
use asciimap::viewer::{self, START_LAT, START_LON, START_ZOOM};

#[derive(Parser)]
#[command(name = "asciimap", about = "Renders slippy-map vector tiles as ASCII maps")]
struct Cli {
  #[arg(long, default_value_t = START_LAT)]
  lat: f64,
  #[arg(long, default_value_t = START_LON)]
  lon: f64,
  #[arg(long, default_value_t = START_ZOOM)]
  zoom: i32,
  #[arg(long, default_value_t = 160)]
  width: usize,
  #[arg(long, default_value_t = 50)]
  height: usize,
  #[arg(long, default_value_t = 0.6)]
  cell_aspect: f64,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Render a single frame and write it to a file.
  Dump {
    #[arg(long, default_value = "map.txt")]
    output: PathBuf,
    /// Skip street-name labels.
    #[arg(long)]
    no_street_names: bool,
  },
  /// Serve the browser viewer.
  Serve {
    #[arg(long, default_value_t = viewer::DEFAULT_PORT)]
    port: u16,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_target(false)
    .with_env_filter(EnvFilter::from_default_env())
    .compact()
    .init();

  let cli = Cli::parse();
  let config = Config::new();
  let mut renderer = MapRenderer::new(CachedTileLoader::from_config(&config));

  match cli.command {
    Command::Dump {
      output,
      no_street_names,
    } => {
      let result = renderer.render_ascii(
        cli.lat,
        cli.lon,
        cli.zoom,
        cli.width,
        cli.height,
        cli.cell_aspect,
        !no_street_names,
      );
      std::fs::write(&output, result.text + "\n")
        .with_context(|| format!("writing {}", output.display()))?;
      eprintln!("{}", style::GLYPH_LEGEND);
      eprintln!(
        "wrote {} ({}x{} at z{})",
        output.display(),
        result.width,
        result.height,
        result.zoom
      );
    }
    Command::Serve { port } => {
      viewer::serve(port, Arc::new(Mutex::new(renderer))).await?;
    }
  }
  Ok(())
}
