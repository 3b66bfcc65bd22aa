use std::path::PathBuf;
use std::time::Duration;

use dirs::home_dir;
use log::error;

use crate::map::session::{DEFAULT_HIT_TOLERANCE_M, MapView};

/// Port the document server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 3000;
/// Quiet period after the last change before an autosave fires.
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 2000;

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  #[serde(skip)]
  pub config_path: Option<PathBuf>,
  /// Base url of the document server the client talks to.
  pub server_url: Option<String>,
  /// Identity sent with every request.
  pub user: Option<String>,
  /// Role sent with every request, `teacher` or `admin` unlock the admin routes.
  pub role: Option<String>,
  /// Where the document server stores files.
  pub documents_dir: Option<PathBuf>,
  pub port: u16,
  pub autosave_interval_ms: u64,
  pub hit_tolerance_m: f64,
  pub map_view: MapView,
}

impl Config {
  #[must_use]
  pub fn new() -> Self {
    let from_env = Self::from_env();
    let from_file = Self::from_file();
    let default = Self::default();

    let mut merged = from_env;
    if let Some(from_file) = &from_file {
      merged = merged.merge(from_file);
    }
    merged = merged.merge(&default);

    if merged.config_path.is_some() && from_file.is_none() {
      merged.init_cfg_file();
    }

    merged
  }

  #[must_use]
  pub fn autosave_interval(&self) -> Duration {
    Duration::from_millis(self.autosave_interval_ms)
  }

  #[must_use]
  pub fn server_url(&self) -> &str {
    self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
  }

  fn from_env() -> Self {
    let config_path = std::env::var("MAPNOTE_CONFIG").ok().map(PathBuf::from);
    let server_url = std::env::var("MAPNOTE_SERVER_URL").ok();
    let user = std::env::var("MAPNOTE_USER").ok();
    let role = std::env::var("MAPNOTE_ROLE").ok();
    let documents_dir = std::env::var("MAPNOTE_DOCUMENTS_DIR")
      .ok()
      .map(PathBuf::from);

    Self {
      config_path,
      server_url,
      user,
      role,
      documents_dir,
      ..Self::unset()
    }
  }

  /// A config with no values set, the neutral element of [`Config::merge`].
  fn unset() -> Self {
    Self {
      config_path: None,
      server_url: None,
      user: None,
      role: None,
      documents_dir: None,
      port: DEFAULT_PORT,
      autosave_interval_ms: DEFAULT_AUTOSAVE_INTERVAL_MS,
      hit_tolerance_m: DEFAULT_HIT_TOLERANCE_M,
      map_view: MapView::default(),
    }
  }

  /// Fills everything `self` leaves unset from `other`.
  fn merge(mut self, other: &Self) -> Self {
    self.config_path = self.config_path.or(other.config_path.clone());
    self.server_url = self.server_url.or(other.server_url.clone());
    self.user = self.user.or(other.user.clone());
    self.role = self.role.or(other.role.clone());
    self.documents_dir = self.documents_dir.or(other.documents_dir.clone());

    // Plain values count as unset while they hold their default.
    if self.port == DEFAULT_PORT {
      self.port = other.port;
    }
    if self.autosave_interval_ms == DEFAULT_AUTOSAVE_INTERVAL_MS {
      self.autosave_interval_ms = other.autosave_interval_ms;
    }
    if (self.hit_tolerance_m - DEFAULT_HIT_TOLERANCE_M).abs() < f64::EPSILON {
      self.hit_tolerance_m = other.hit_tolerance_m;
    }
    if self.map_view == MapView::default() {
      self.map_view = other.map_view;
    }

    self
  }

  fn from_file() -> Option<Self> {
    let config_path = Self::config_dir()?.join("config.json");

    serde_json::from_str(&std::fs::read_to_string(&config_path).ok()?)
      .inspect_err(|e| error!("Failed to read config file: {e}"))
      .ok()
  }

  fn config_dir() -> Option<PathBuf> {
    std::env::var("MAPNOTE_CONFIG")
      .ok()
      .map(PathBuf::from)
      .or_else(|| home_dir().map(|p| p.join(".config").join("mapnote")))
  }

  fn init_cfg_file(&self) {
    let Some(path) = &self.config_path else {
      return;
    };
    if !path.exists() {
      let _ = std::fs::create_dir_all(path).inspect_err(|e| {
        error!("Failed to create config directory: {e}");
      });
    }

    let path = path.join("config.json");
    if !path.exists() {
      let config = serde_json::to_string_pretty(self);
      if let Ok(config) = config {
        let _ = std::fs::write(path, config).inspect_err(|e| {
          error!("Failed to write config file: {e}");
        });
      } else {
        error!("Failed to serialize config");
      }
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      config_path: home_dir().map(|p| p.join(".config").join("mapnote")),
      server_url: Some(DEFAULT_SERVER_URL.to_owned()),
      documents_dir: home_dir().map(|p| p.join(".mapnote_documents")),
      ..Self::unset()
    }
  }
}
