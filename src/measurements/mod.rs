//! Time series of exercise measurements, one record per tracked page.

mod storage;

use chrono::{DateTime, Utc};
use color_eyre::Result;

pub use storage::SqliteMeasurements;

/// A single recorded value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
  pub date: DateTime<Utc>,
  pub value: f64,
}

/// Everything stored for one tracked page
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItemRecord {
  /// Trimmed page ID
  pub identifier: String,
  pub description: String,
  /// Oldest first
  pub measurements: Vec<Measurement>,
  pub last_updated_date: DateTime<Utc>,
}

/// Trait for measurement storage backends.
///
/// Identifiers are trimmed by implementations before every lookup and write.
pub trait MeasurementStore: Send + Sync {
  /// When the identifier last received a measurement.
  fn get_last_updated(&self, identifier: &str) -> Result<Option<DateTime<Utc>>>;

  /// Value of the most recent measurement, if any.
  fn get_latest_measurement_value(&self, identifier: &str) -> Result<Option<f64>>;

  /// Append `measurement`, creating the record on first sight.
  ///
  /// Must be atomic per identifier.
  fn upsert_measurement(
    &self,
    identifier: &str,
    description: &str,
    measurement: &Measurement,
  ) -> Result<()>;

  /// Note that every tracked item was satisfied this cycle.
  fn record_strike_event(&self) -> Result<()>;
}
