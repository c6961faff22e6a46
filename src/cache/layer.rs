//! Cache layer that decides between re-enumerating pages and reusing the stored list.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::future::Future;
use tracing::{debug, info};

use super::traits::{CacheResult, CachedPageIdSet, PageIdCache};

/// True iff both timestamps are present and `first` is strictly later.
pub fn comes_after(first: Option<DateTime<Utc>>, second: Option<DateTime<Utc>>) -> bool {
  match (first, second) {
    (Some(first), Some(second)) => first > second,
    _ => false,
  }
}

/// Cache layer over a page ID store.
///
/// The stored enumeration is trusted until the root page reports an edit
/// newer than the enumeration itself. Rows added to a child database without
/// touching the root do not move the root's edit time, so such additions stay
/// invisible until something else edits the root.
pub struct CacheLayer<S: PageIdCache> {
  storage: S,
}

impl<S: PageIdCache> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self { storage }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Whether `cached` must be replaced given the root's last edit.
  pub fn needs_refresh(
    cached: Option<&CachedPageIdSet>,
    root_edited_at: Option<DateTime<Utc>>,
  ) -> bool {
    match cached {
      None => true,
      Some(cached) => comes_after(root_edited_at, Some(cached.date)),
    }
  }

  /// Fetch the page ID list with a cache-first strategy.
  ///
  /// 1. Read the stored enumeration
  /// 2. If present and not older than the root's last edit, return it
  /// 3. Otherwise enumerate through `fetcher` and replace the stored record
  ///
  /// Replacement is delete-all then insert. If the process dies in between,
  /// the store is left empty and the next run refreshes.
  pub async fn fetch_page_ids<F, Fut>(
    &self,
    root_edited_at: Option<DateTime<Utc>>,
    fetcher: F,
  ) -> Result<CacheResult<CachedPageIdSet>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
  {
    let cached = self.storage.read_cache()?;
    let had_cache = cached.is_some();

    match cached {
      Some(cached) if !Self::needs_refresh(Some(&cached), root_edited_at) => {
        debug!(
          cached_at = %cached.date,
          pages = cached.page_ids.len(),
          "Reusing cached page IDs"
        );
        let cached_at = cached.date;
        return Ok(CacheResult::from_cache(cached, cached_at));
      }
      _ => {}
    }

    // Stamped before enumerating so root edits made meanwhile still count as newer
    let refreshed_at = Utc::now();
    let page_ids = fetcher().await?;
    let fresh = CachedPageIdSet {
      date: refreshed_at,
      page_ids,
    };

    self.storage.delete_all_cache()?;
    self.storage.write_cache(&fresh)?;

    info!(
      pages = fresh.page_ids.len(),
      had_cache,
      "Refreshed page ID cache"
    );

    Ok(CacheResult::from_network(fresh))
  }
}
