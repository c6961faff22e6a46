//! SQLite implementation of the page ID cache.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::traits::{CachedPageIdSet, PageIdCache};
use crate::db::{format_datetime, parse_datetime, Database};

/// SQLite-based page ID cache, scoped to one root page.
pub struct SqliteStorage {
  db: Arc<Database>,
  root_key: String,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>, root_page_id: &str) -> Self {
    Self {
      db,
      root_key: root_cache_key(root_page_id),
    }
  }
}

/// Stable key for a root page. Notion accepts IDs with or without dashes,
/// both spellings map to the same key.
fn root_cache_key(root_page_id: &str) -> String {
  let normalized: String = root_page_id
    .trim()
    .chars()
    .filter(|c| *c != '-')
    .flat_map(char::to_lowercase)
    .collect();

  let mut hasher = Sha256::new();
  hasher.update(normalized.as_bytes());
  hex::encode(hasher.finalize())
}

impl PageIdCache for SqliteStorage {
  fn read_cache(&self) -> Result<Option<CachedPageIdSet>> {
    let conn = self.db.conn()?;

    let record: Option<(i64, String)> = conn
      .query_row(
        "SELECT id, cached_at FROM page_id_cache
         WHERE root_key = ?
         ORDER BY id DESC LIMIT 1",
        params![self.root_key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read page ID cache: {}", e))?;

    let (cache_id, cached_at) = match record {
      Some(r) => r,
      None => return Ok(None),
    };

    let mut stmt = conn
      .prepare(
        "SELECT page_id FROM page_id_cache_entries
         WHERE cache_id = ?
         ORDER BY position",
      )
      .map_err(|e| eyre!("Failed to prepare cache entry query: {}", e))?;

    let page_ids = stmt
      .query_map(params![cache_id], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to query cached page IDs: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cached page ID: {}", e))?;

    Ok(Some(CachedPageIdSet {
      date: parse_datetime(&cached_at)?,
      page_ids,
    }))
  }

  fn write_cache(&self, set: &CachedPageIdSet) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT INTO page_id_cache (root_key, cached_at) VALUES (?, ?)",
      params![self.root_key, format_datetime(&set.date)],
    )
    .map_err(|e| eyre!("Failed to insert page ID cache: {}", e))?;
    let cache_id = tx.last_insert_rowid();

    for (position, page_id) in set.page_ids.iter().enumerate() {
      tx.execute(
        "INSERT INTO page_id_cache_entries (cache_id, position, page_id) VALUES (?, ?, ?)",
        params![cache_id, position as i64, page_id],
      )
      .map_err(|e| eyre!("Failed to store cached page ID: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_all_cache(&self) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute_batch(
        "DELETE FROM page_id_cache_entries;
         DELETE FROM page_id_cache;",
      )
      .map_err(|e| eyre!("Failed to delete page ID cache: {}", e))?;
    Ok(())
  }
}
