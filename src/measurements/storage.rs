use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::{Measurement, MeasurementStore, TrackedItemRecord};
use crate::db::{format_datetime, parse_datetime, Database};

/// SQLite-backed measurement store
pub struct SqliteMeasurements {
  db: Arc<Database>,
}

impl SqliteMeasurements {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Load the full record for an identifier.
  pub fn get_record(&self, identifier: &str) -> Result<Option<TrackedItemRecord>> {
    let identifier = identifier.trim();
    let conn = self.db.conn()?;

    let row: Option<(String, String)> = conn
      .query_row(
        "SELECT description, last_updated_date FROM exercise_data WHERE page_id = ?",
        params![identifier],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load exercise {}: {}", identifier, e))?;

    let (description, last_updated) = match row {
      Some(r) => r,
      None => return Ok(None),
    };

    let mut stmt = conn
      .prepare(
        "SELECT measured_at, value FROM measurements
         WHERE page_id = ?
         ORDER BY position",
      )
      .map_err(|e| eyre!("Failed to prepare measurement query: {}", e))?;

    let rows = stmt
      .query_map(params![identifier], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
      })
      .map_err(|e| eyre!("Failed to query measurements: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read measurement: {}", e))?;

    let measurements = rows
      .into_iter()
      .map(|(date, value)| {
        Ok(Measurement {
          date: parse_datetime(&date)?,
          value,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Some(TrackedItemRecord {
      identifier: identifier.to_string(),
      description,
      measurements,
      last_updated_date: parse_datetime(&last_updated)?,
    }))
  }

  /// Number of recorded strike events.
  pub fn strike_count(&self) -> Result<u64> {
    let count: i64 = self
      .db
      .conn()?
      .query_row("SELECT COUNT(*) FROM strike_records", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count strike records: {}", e))?;
    Ok(count as u64)
  }
}

impl MeasurementStore for SqliteMeasurements {
  fn get_last_updated(&self, identifier: &str) -> Result<Option<DateTime<Utc>>> {
    let identifier = identifier.trim();
    let last_updated: Option<String> = self
      .db
      .conn()?
      .query_row(
        "SELECT last_updated_date FROM exercise_data WHERE page_id = ?",
        params![identifier],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load last update of {}: {}", identifier, e))?;

    last_updated.as_deref().map(parse_datetime).transpose()
  }

  fn get_latest_measurement_value(&self, identifier: &str) -> Result<Option<f64>> {
    let identifier = identifier.trim();
    self
      .db
      .conn()?
      .query_row(
        "SELECT value FROM measurements
         WHERE page_id = ?
         ORDER BY position DESC LIMIT 1",
        params![identifier],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load latest measurement of {}: {}", identifier, e))
  }

  fn upsert_measurement(
    &self,
    identifier: &str,
    description: &str,
    measurement: &Measurement,
  ) -> Result<()> {
    let identifier = identifier.trim();
    let now = format_datetime(&Utc::now());

    // Read-modify-write under the connection lock and in one transaction
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let updated = tx
      .execute(
        "UPDATE exercise_data SET last_updated_date = ? WHERE page_id = ?",
        params![now, identifier],
      )
      .map_err(|e| eyre!("Failed to update exercise {}: {}", identifier, e))?;

    if updated == 0 {
      tx.execute(
        "INSERT INTO exercise_data (page_id, description, last_updated_date) VALUES (?, ?, ?)",
        params![identifier, description, now],
      )
      .map_err(|e| eyre!("Failed to create exercise {}: {}", identifier, e))?;
    }

    let position: i64 = tx
      .query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM measurements WHERE page_id = ?",
        params![identifier],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to find next measurement slot: {}", e))?;

    tx.execute(
      "INSERT INTO measurements (page_id, position, measured_at, value) VALUES (?, ?, ?, ?)",
      params![
        identifier,
        position,
        format_datetime(&measurement.date),
        measurement.value
      ],
    )
    .map_err(|e| eyre!("Failed to append measurement for {}: {}", identifier, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn record_strike_event(&self) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT INTO strike_records (strike_date) VALUES (?)",
        params![format_datetime(&Utc::now())],
      )
      .map_err(|e| eyre!("Failed to record strike: {}", e))?;
    Ok(())
  }
}
