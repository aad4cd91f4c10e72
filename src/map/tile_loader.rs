use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, error, trace, warn};
use surf::http::Method;
use surf::{Config, Request, Url};
use surf_governor::GovernorMiddleware;

use crate::map::coordinates::Tile;
use crate::map::mvt::{self, DecodedTile};

/// The raw MVT bytes of a tile.
pub type TileData = Vec<u8>;

/// Maximum number of decoded tiles held in memory.
pub const TILE_CACHE_CAPACITY: usize = 512;

/// Supplies raw tile bytes. `None` means the tile could not be produced,
/// which renders as a blank area instead of failing the frame.
pub trait TileFetcher: Send + Sync {
  fn fetch(&self, tile: &Tile) -> Option<TileData>;
}

/// Fetches tiles over HTTP from a `{z}/{x}/{y}` URL template.
#[derive(Debug)]
pub struct HttpFetcher {
  url_template: String,
  client: surf::Client,
}

impl HttpFetcher {
  #[must_use]
  pub fn new(url_template: &str) -> Self {
    let client: surf::Client = Config::new()
      .set_timeout(Some(Duration::from_secs(5)))
      .try_into()
      .expect("client");
    Self {
      url_template: url_template.to_string(),
      client: client.with(GovernorMiddleware::per_second(10).unwrap()),
    }
  }

  fn url_for_tile(&self, tile: &Tile) -> String {
    self
      .url_template
      .replace("{z}", &tile.zoom.to_string())
      .replace("{x}", &tile.x.to_string())
      .replace("{y}", &tile.y.to_string())
  }
}

impl TileFetcher for HttpFetcher {
  fn fetch(&self, tile: &Tile) -> Option<TileData> {
    let url = self.url_for_tile(tile);
    async_std::task::block_on(async {
      let request = Request::new(Method::Get, Url::parse(&url).ok()?);
      let mut response = self
        .client
        .send(request)
        .await
        .inspect_err(|e| error!("Error when downloading tile: {e}"))
        .ok()?;
      if response.status() != 200 {
        warn!("Tile request failed: {} {url}", response.status());
        return None;
      }
      let body = response.body_bytes().await.ok()?;
      debug!("Downloaded {tile:?} ({} bytes)", body.len());
      if body.is_empty() { None } else { Some(body) }
    })
  }
}

/// On-disk tier of the tile cache, storing the exact fetched bytes at
/// `{base}/{z}/{x}/{y}.mvt`.
#[derive(Debug, Clone)]
struct DiskCache {
  base_path: Option<PathBuf>,
}

impl DiskCache {
  fn path(&self, tile: &Tile) -> Option<PathBuf> {
    self.base_path.clone().map(|b| {
      b.join(tile.zoom.to_string())
        .join(tile.x.to_string())
        .join(format!("{}.mvt", tile.y))
    })
  }

  fn contains(&self, tile: &Tile) -> bool {
    self
      .path(tile)
      .and_then(|p| fs::metadata(p).ok())
      .is_some_and(|m| m.len() > 0)
  }

  fn read(&self, tile: &Tile) -> Option<TileData> {
    let path = self.path(tile)?;
    let metadata = fs::metadata(&path).ok()?;
    if metadata.len() == 0 {
      // A zero-byte file is the residue of a failed fetch; dropping it
      // forces a refetch instead of a permanently blank tile.
      let _ = fs::remove_file(&path);
      return None;
    }
    fs::read(&path).ok()
  }

  fn write(&self, tile: &Tile, data: &[u8]) {
    let Some(path) = self.path(tile) else { return };
    if let Some(parent) = path.parent()
      && fs::create_dir_all(parent).is_err()
    {
      return;
    }
    let _ = fs::write(&path, data).inspect_err(|e| debug!("Error when writing tile file: {e}"));
  }
}

/// Decoded tiles with least-recently-used eviction.
#[derive(Debug)]
struct DecodedTileLru {
  entries: HashMap<Tile, DecodedTile>,
  order: VecDeque<Tile>,
  capacity: usize,
}

impl DecodedTileLru {
  fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: HashMap::new(),
      order: VecDeque::new(),
      capacity,
    }
  }

  fn touch(&mut self, tile: &Tile) {
    if let Some(pos) = self.order.iter().position(|t| t == tile) {
      self.order.remove(pos);
      self.order.push_back(*tile);
    }
  }

  fn contains(&self, tile: &Tile) -> bool {
    self.entries.contains_key(tile)
  }

  /// Looks a tile up and marks it most recently used.
  fn get(&mut self, tile: &Tile) -> Option<&DecodedTile> {
    if self.entries.contains_key(tile) {
      self.touch(tile);
    }
    self.entries.get(tile)
  }

  fn insert(&mut self, tile: Tile, decoded: DecodedTile) {
    if self.entries.insert(tile, decoded).is_some() {
      self.touch(&tile);
    } else {
      self.order.push_back(tile);
    }
    while self.entries.len() > self.capacity {
      let Some(evicted) = self.order.pop_front() else {
        break;
      };
      self.entries.remove(&evicted);
      trace!("evicting {evicted:?} from the tile cache");
    }
  }

  fn len(&self) -> usize {
    self.entries.len()
  }
}

/// Background pool for cache warming, separate from any async runtime so
/// blocking HTTP calls never stall it.
static PREFETCH_POOL: LazyLock<rayon::ThreadPool> = LazyLock::new(|| {
  rayon::ThreadPoolBuilder::new()
    .num_threads(4)
    .thread_name(|i| format!("tile-fetch-{i}"))
    .build()
    .expect("Failed to create tile prefetch pool")
});

/// Two-tier tile store: a disk cache of raw bytes under an in-memory LRU
/// of decoded tiles, fed by a [`TileFetcher`] on misses.
pub struct CachedTileLoader {
  disk_cache: DiskCache,
  fetcher: Arc<dyn TileFetcher>,
  decoded: DecodedTileLru,
}

impl CachedTileLoader {
  #[must_use]
  pub fn new(fetcher: Arc<dyn TileFetcher>, cache_dir: Option<PathBuf>) -> Self {
    Self {
      disk_cache: DiskCache {
        base_path: cache_dir,
      },
      fetcher,
      decoded: DecodedTileLru::with_capacity(TILE_CACHE_CAPACITY),
    }
  }

  #[must_use]
  pub fn from_config(config: &crate::config::Config) -> Self {
    let url = config
      .tile_url
      .as_deref()
      .unwrap_or(crate::config::DEFAULT_TILE_URL);
    Self::new(Arc::new(HttpFetcher::new(url)), config.tile_cache_dir.clone())
  }

  /// The decoded tile, from cache or by fetching. A failed fetch or a
  /// malformed tile yields an empty tile, cached like any other so it is
  /// not refetched every frame.
  pub fn get_decoded_tile(&mut self, tile: &Tile) -> &DecodedTile {
    if !self.decoded.contains(tile) {
      let decoded = self.load_and_decode(tile);
      self.decoded.insert(*tile, decoded);
    } else {
      trace!("cache_hit: {tile:?}");
    }
    self
      .decoded
      .get(tile)
      .expect("tile inserted right above")
  }

  /// Number of decoded tiles currently held in memory.
  #[must_use]
  pub fn tile_cache_size(&self) -> usize {
    self.decoded.len()
  }

  /// Warms the disk cache for the given tiles on a background pool.
  /// Purely advisory; decoding still happens on the render path.
  pub fn prefetch(&self, tiles: impl IntoIterator<Item = Tile>) {
    for tile in tiles {
      if self.decoded.contains(&tile) || self.disk_cache.contains(&tile) {
        continue;
      }
      let fetcher = Arc::clone(&self.fetcher);
      let disk_cache = self.disk_cache.clone();
      PREFETCH_POOL.spawn(move || {
        if let Some(bytes) = fetcher.fetch(&tile) {
          disk_cache.write(&tile, &bytes);
        }
      });
    }
  }

  fn load_and_decode(&self, tile: &Tile) -> DecodedTile {
    let raw = self.disk_cache.read(tile).or_else(|| self.download(tile));
    raw.map_or_else(DecodedTile::default, |bytes| mvt::decode(&bytes, true))
  }

  fn download(&self, tile: &Tile) -> Option<TileData> {
    trace!("cache_miss: {tile:?}");
    let data = self.fetcher.fetch(tile)?;
    // Persisting is best effort; a render must not fail on a full disk.
    self.disk_cache.write(tile, &data);
    Some(data)
  }
}
