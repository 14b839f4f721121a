use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Runtime settings for the host process.
///
/// The routing table, version tag and pre-cache list are compiled in and
/// cannot be changed here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Scope URL of the itinerary page; relative pre-cache entries resolve against it
  pub origin: String,
  /// Cache database path (defaults to $XDG_DATA_HOME/trip-sw/cache.db)
  pub database: Option<PathBuf>,
  /// Network timeout per request, in seconds
  pub timeout_secs: u64,
  /// Write logs to a file in this directory instead of stderr
  pub log_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8000/".to_string(),
      database: None,
      timeout_secs: 30,
      log_dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trip-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trip-sw/config.yaml
  ///
  /// Without a file, built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("trip-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trip-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    // Fail early on a bad origin rather than at install time
    config.origin_url()?;

    Ok(config)
  }

  /// The page origin as a URL. A missing trailing slash is added so that
  /// relative entries resolve inside the scope rather than next to it.
  pub fn origin_url(&self) -> Result<Url> {
    let origin = if self.origin.ends_with('/') {
      self.origin.clone()
    } else {
      format!("{}/", self.origin)
    };
    Url::parse(&origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}
