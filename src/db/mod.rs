pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Shared SQLite connection used by the cache and measurement stores
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database from a connection string.
  ///
  /// Accepts a filesystem path, a `file:` URI or `:memory:`.
  pub fn open(url: &str) -> Result<Self> {
    let conn = if url == ":memory:" {
      Connection::open_in_memory()
        .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?
    } else {
      if !url.starts_with("file:") {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(url).parent().filter(|p| !p.as_os_str().is_empty()) {
          std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
        }
      }
      Connection::open(url).map_err(|e| eyre!("Failed to open database at {}: {}", url, e))?
    };

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    Self::open(":memory:")
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Lock the connection
  pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Format a timestamp for storage. Fixed width, so text order is time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a timestamp written by [`format_datetime`].
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
