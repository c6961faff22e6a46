//! Core traits and types for the page ID cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

/// Enumeration of every tracked page, as of `date`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPageIdSet {
  /// When the enumeration was taken
  pub date: DateTime<Utc>,
  /// Page IDs in enumeration order
  pub page_ids: Vec<String>,
}

/// Trait for page ID cache backends.
///
/// Writes do not replace earlier records. Callers keep the single-record
/// invariant by deleting before writing.
pub trait PageIdCache: Send + Sync {
  /// Get the stored enumeration, if any.
  fn read_cache(&self) -> Result<Option<CachedPageIdSet>>;

  /// Insert a new enumeration record.
  fn write_cache(&self, set: &CachedPageIdSet) -> Result<()>;

  /// Remove every stored record.
  fn delete_all_cache(&self) -> Result<()>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_refreshed(&self) -> bool {
    self.source == CacheSource::Network
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Re-enumerated from the workspace
  Network,
  /// Stored enumeration, still describes the workspace
  CacheFresh,
}
