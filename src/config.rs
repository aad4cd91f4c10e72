use std::path::PathBuf;

use dirs::home_dir;
use log::error;

pub const DEFAULT_TILE_URL: &str = "https://tiles.openfreemap.org/planet/latest/{z}/{x}/{y}.pbf";

/// Application configuration. Three layers can set a field; environment
/// variables win over the config file, which wins over built-in defaults.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
  pub config_path: Option<PathBuf>,
  /// Tile URL template with `{z}`, `{x}` and `{y}` placeholders.
  pub tile_url: Option<String>,
  pub tile_cache_dir: Option<PathBuf>,
}

/// First layer that sets the field, highest precedence first.
fn first_set<T>(layers: [Option<T>; 3]) -> Option<T> {
  layers.into_iter().flatten().next()
}

impl Config {
  #[must_use]
  pub fn new() -> Self {
    let env = Self::from_env();
    let file = Self::read_file();
    let had_file = file.is_some();
    let file = file.unwrap_or(Self {
      config_path: None,
      tile_url: None,
      tile_cache_dir: None,
    });
    let defaults = Self::default();

    let config = Self {
      config_path: first_set([env.config_path, file.config_path, defaults.config_path]),
      tile_url: first_set([env.tile_url, file.tile_url, defaults.tile_url]),
      tile_cache_dir: first_set([
        env.tile_cache_dir,
        file.tile_cache_dir,
        defaults.tile_cache_dir,
      ]),
    };
    if !had_file {
      config.write_initial_file();
    }
    config
  }

  fn from_env() -> Self {
    Self {
      config_path: std::env::var("ASCIIMAP_CONFIG").ok().map(PathBuf::from),
      tile_url: std::env::var("ASCIIMAP_TILE_URL").ok(),
      tile_cache_dir: std::env::var("ASCIIMAP_TILE_CACHE_DIR")
        .ok()
        .map(PathBuf::from),
    }
  }

  fn config_dir() -> Option<PathBuf> {
    std::env::var("ASCIIMAP_CONFIG")
      .ok()
      .map(PathBuf::from)
      .or_else(|| home_dir().map(|h| h.join(".config").join("asciimap")))
  }

  fn read_file() -> Option<Self> {
    let raw = std::fs::read_to_string(Self::config_dir()?.join("config.json")).ok()?;
    match serde_json::from_str(&raw) {
      Ok(config) => Some(config),
      Err(e) => {
        error!("Ignoring unreadable config file: {e}");
        None
      }
    }
  }

  /// Seeds a config file with the effective settings so users have
  /// something to edit. Skipped silently when nothing can be written.
  fn write_initial_file(&self) {
    let Some(dir) = &self.config_path else { return };
    if let Err(e) = std::fs::create_dir_all(dir) {
      error!("Cannot create config directory {}: {e}", dir.display());
      return;
    }
    let file = dir.join("config.json");
    if file.exists() {
      return;
    }
    match serde_json::to_string_pretty(self) {
      Ok(json) => {
        if let Err(e) = std::fs::write(&file, json) {
          error!("Cannot write {}: {e}", file.display());
        }
      }
      Err(e) => error!("Cannot serialize configuration: {e}"),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      config_path: home_dir().map(|p| p.join(".config").join("asciimap")),
      tile_url: Some(DEFAULT_TILE_URL.to_string()),
      tile_cache_dir: home_dir().map(|p| p.join(".asciimaps").join("cache")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_set_takes_the_earliest_layer() {
    assert_eq!(first_set([None, Some(2), Some(3)]), Some(2));
    assert_eq!(first_set([Some(1), None, Some(3)]), Some(1));
    assert_eq!(first_set::<u8>([None, None, None]), None);
  }

  #[test]
  fn defaults_fill_every_field() {
    let config = Config::default();
    assert_eq!(config.tile_url.as_deref(), Some(DEFAULT_TILE_URL));
    assert!(config.config_path.is_some());
    assert!(config.tile_cache_dir.is_some());
  }

  #[test]
  fn default_cache_dir_lives_under_home() {
    let dir = Config::default().tile_cache_dir.unwrap();
    assert!(dir.ends_with(PathBuf::from(".asciimaps").join("cache")));
  }
}
