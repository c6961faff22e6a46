use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_NOTION_URL: &str = "https://api.notion.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub notion: NotionConfig,
  /// SQLite connection string: a path, a `file:` URI or `:memory:`
  pub database: Option<String>,
  /// Directory for the rolling log file (defaults to the data directory)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
  /// Page that holds the tracked child databases
  pub root_page_id: Option<String>,
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default)]
  pub properties: PropertyNames,
}

impl Default for NotionConfig {
  fn default() -> Self {
    Self {
      root_page_id: None,
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
      properties: PropertyNames::default(),
    }
  }
}

fn default_base_url() -> String {
  DEFAULT_NOTION_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  DEFAULT_TIMEOUT_SECS
}

/// Names of the page properties read and written on every tracked page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
  pub title: String,
  pub measurement: String,
  pub status: String,
  pub last_modified: String,
}

impl Default for PropertyNames {
  fn default() -> Self {
    Self {
      title: "Title".to_string(),
      measurement: "Performances".to_string(),
      status: "Status".to_string(),
      last_modified: "Last Modified".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trainsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trainsync/config.yaml
  ///
  /// A missing file is fine, everything can come from the environment.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_overrides(|key| std::env::var(key).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("trainsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trainsync").join("config.yaml");
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

    Ok(config)
  }

  /// Apply `PAGE_ID` and `TRAINSYNC_DATABASE` on top of file values.
  fn with_overrides<F>(mut self, lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(page_id) = lookup("PAGE_ID").filter(|v| !v.trim().is_empty()) {
      self.notion.root_page_id = Some(page_id);
    }
    if let Some(database) = lookup("TRAINSYNC_DATABASE").filter(|v| !v.trim().is_empty()) {
      self.database = Some(database);
    }
    self
  }

  /// Root page ID, required for every run.
  pub fn root_page_id(&self) -> Result<&str> {
    self
      .notion
      .root_page_id
      .as_deref()
      .map(str::trim)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| {
        eyre!("Root page ID not configured. Set PAGE_ID or notion.root_page_id in the config file.")
      })
  }

  /// Connection string for the measurement database.
  pub fn database_url(&self) -> Result<String> {
    match &self.database {
      Some(db) => Ok(db.clone()),
      None => Ok(Self::default_data_dir()?
        .join("trainsync.db")
        .to_string_lossy()
        .into_owned()),
    }
  }

  /// Directory for the rolling log file.
  pub fn log_dir(&self) -> Result<PathBuf> {
    match &self.log_dir {
      Some(dir) => Ok(dir.clone()),
      None => Ok(Self::default_data_dir()?.join("logs")),
    }
  }

  fn default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("trainsync"))
  }

  /// Get the Notion integration token from the environment.
  ///
  /// The token is never read from the config file.
  pub fn get_api_token() -> Result<String> {
    std::env::var("NOTION_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| eyre!("Notion token not found. Set the NOTION_TOKEN environment variable."))
  }
}
