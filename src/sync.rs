//! One synchronization cycle from the Notion workspace into the measurement store.
//!
//! A cycle moves through fixed stages:
//!
//! ```text
//! Idle -> CacheValidated -> Snapshotted -> Diffed -> Persisted -> WorkspaceReset -> Idle
//! ```
//!
//! Failures before persistence abort the cycle. From persistence on, every
//! per-item write is attempted and its outcome lands in the [`SyncReport`].

use chrono::{NaiveDate, Utc};
use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, CachedPageIdSet, PageIdCache, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::measurements::{Measurement, MeasurementStore, SqliteMeasurements};
use crate::notion::{NotionClient, RemoteItem, Workspace};

/// Stage of a sync cycle, attached to errors that abort it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  CacheValidation,
  Snapshot,
  Diff,
  Persist,
  WorkspaceReset,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::CacheValidation => "cache validation",
      Stage::Snapshot => "snapshot",
      Stage::Diff => "diff",
      Stage::Persist => "persist",
      Stage::WorkspaceReset => "workspace reset",
    };
    f.write_str(name)
  }
}

/// Outcome of the initialisation phase
#[derive(Debug, Clone)]
pub struct CacheLoad {
  pub cache: CachedPageIdSet,
  /// Whether the page list was re-enumerated this run
  pub refreshed: bool,
}

/// A tracked item whose value differs from the last stored one
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
  pub page_id: String,
  pub description: String,
  pub previous_value: Option<f64>,
  pub value: f64,
}

/// Per-item write that a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOperation {
  Persist,
  UncheckStatus,
  RecordStrike,
  StampLastModified,
}

impl ItemOperation {
  pub fn stage(&self) -> Stage {
    match self {
      ItemOperation::Persist => Stage::Persist,
      ItemOperation::UncheckStatus
      | ItemOperation::RecordStrike
      | ItemOperation::StampLastModified => Stage::WorkspaceReset,
    }
  }
}

impl fmt::Display for ItemOperation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ItemOperation::Persist => "persist measurement",
      ItemOperation::UncheckStatus => "uncheck status",
      ItemOperation::RecordStrike => "record strike",
      ItemOperation::StampLastModified => "stamp last modified",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
  pub page_id: String,
  pub operation: ItemOperation,
  pub error: String,
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
  pub cache_refreshed: bool,
  pub snapshot_size: usize,
  pub changes: Vec<ItemChange>,
  pub all_checked: bool,
  pub strike_recorded: bool,
  pub failures: Vec<ItemFailure>,
}

impl SyncReport {
  pub fn has_failures(&self) -> bool {
    !self.failures.is_empty()
  }

  /// Turn a partial failure into an error listing every failed item.
  pub fn into_result(self) -> Result<Self> {
    if !self.has_failures() {
      return Ok(self);
    }

    let details = self
      .failures
      .iter()
      .map(|f| format!("  {} {}: {}", f.operation, f.page_id, f.error))
      .collect::<Vec<_>>()
      .join("\n");

    Err(eyre!(
      "Sync partially failed, {} of the cycle's writes did not complete:\n{}",
      self.failures.len(),
      details
    ))
  }
}

/// True if every item with a checkbox status is checked. Empty snapshots count as checked.
pub fn all_checked(snapshot: &[RemoteItem]) -> bool {
  snapshot
    .iter()
    .all(|item| item.checkbox_state.unwrap_or(true))
}

/// An item needs a new measurement when nothing is stored or the value moved.
pub fn needs_update(previous: Option<f64>, current: f64) -> bool {
  previous != Some(current)
}

/// Orchestrates sync cycles for one root page
pub struct Synchronizer<W, C, M>
where
  W: Workspace,
  C: PageIdCache,
  M: MeasurementStore,
{
  workspace: W,
  root_page_id: String,
  cache: CacheLayer<C>,
  measurements: M,
}

/// Synchronizer wired to the real Notion API and SQLite
pub type NotionSynchronizer = Synchronizer<NotionClient, SqliteStorage, SqliteMeasurements>;

impl NotionSynchronizer {
  /// Open the store (running migrations) and build the Notion client.
  pub fn from_config(config: &Config) -> Result<Self> {
    let root_page_id = config.root_page_id()?.to_string();
    let database_url = config.database_url()?;

    let db = Arc::new(Database::open(&database_url)?);
    let workspace = NotionClient::new(config)?;

    Ok(Synchronizer::new(
      workspace,
      root_page_id.clone(),
      SqliteStorage::new(Arc::clone(&db), &root_page_id),
      SqliteMeasurements::new(db),
    ))
  }
}

impl<W, C, M> Synchronizer<W, C, M>
where
  W: Workspace,
  C: PageIdCache,
  M: MeasurementStore,
{
  pub fn new(
    workspace: W,
    root_page_id: impl Into<String>,
    cache_storage: C,
    measurements: M,
  ) -> Self {
    Self {
      workspace,
      root_page_id: root_page_id.into(),
      cache: CacheLayer::new(cache_storage),
      measurements,
    }
  }

  pub fn workspace(&self) -> &W {
    &self.workspace
  }

  pub fn cache(&self) -> &CacheLayer<C> {
    &self.cache
  }

  pub fn measurements(&self) -> &M {
    &self.measurements
  }

  /// Initialisation phase: validate the page ID cache against the root page.
  pub async fn initialize(&self) -> Result<CacheLoad> {
    let root_edited = self
      .workspace
      .block_last_edited(&self.root_page_id)
      .await
      .wrap_err_with(|| format!("Sync failed during {}", Stage::CacheValidation))?;

    let result = self
      .cache
      .fetch_page_ids(root_edited, || self.enumerate_page_ids())
      .await
      .wrap_err_with(|| format!("Sync failed during {}", Stage::CacheValidation))?;

    Ok(CacheLoad {
      refreshed: result.is_refreshed(),
      cache: result.data,
    })
  }

  /// Every row of every child database under the root.
  async fn enumerate_page_ids(&self) -> Result<Vec<String>> {
    let databases = self.workspace.child_database_ids(&self.root_page_id).await?;

    let mut page_ids = Vec::new();
    for database_id in &databases {
      page_ids.extend(self.workspace.database_page_ids(database_id).await?);
    }

    debug!(
      databases = databases.len(),
      pages = page_ids.len(),
      "Enumerated tracked pages"
    );
    Ok(page_ids)
  }

  /// Fetch every cached page. Partially loaded pages are left out.
  pub async fn snapshot(&self, cache: &CachedPageIdSet) -> Result<Vec<RemoteItem>> {
    let mut items = Vec::with_capacity(cache.page_ids.len());
    for page_id in &cache.page_ids {
      if let Some(item) = self
        .workspace
        .page(page_id)
        .await
        .wrap_err_with(|| format!("Sync failed during {}", Stage::Snapshot))?
      {
        items.push(item);
      }
    }
    Ok(items)
  }

  /// Items whose current value differs from the last stored one.
  pub fn diff(&self, snapshot: &[RemoteItem]) -> Result<Vec<ItemChange>> {
    let mut changes = Vec::new();
    for item in snapshot {
      let previous = self
        .measurements
        .get_latest_measurement_value(&item.id)
        .wrap_err_with(|| format!("Sync failed during {}", Stage::Diff))?;

      if needs_update(previous, item.measurement_value) {
        changes.push(ItemChange {
          page_id: item.id.trim().to_string(),
          description: item.description.clone(),
          previous_value: previous,
          value: item.measurement_value,
        });
      }
    }
    Ok(changes)
  }

  fn persist(&self, changes: &[ItemChange]) -> Vec<ItemFailure> {
    let now = Utc::now();
    let mut failures = Vec::new();

    for change in changes {
      let measurement = Measurement {
        date: now,
        value: change.value,
      };
      let last_updated = match self.measurements.get_last_updated(&change.page_id) {
        Ok(last_updated) => last_updated,
        Err(e) => {
          warn!(page_id = %change.page_id, error = %e, "Could not read last update time");
          None
        }
      };

      match self
        .measurements
        .upsert_measurement(&change.page_id, &change.description, &measurement)
      {
        Ok(()) => debug!(
          page_id = %change.page_id,
          description = %change.description,
          previous = ?change.previous_value,
          value = change.value,
          last_updated = ?last_updated,
          "Stored measurement"
        ),
        Err(e) => failures.push(ItemFailure {
          page_id: change.page_id.clone(),
          operation: ItemOperation::Persist,
          error: format!("{:#}", e),
        }),
      }
    }

    failures
  }

  /// Uncheck every cached page and log a strike. Returns whether the strike was stored.
  async fn reset_checkboxes(&self, cache: &CachedPageIdSet) -> (bool, Vec<ItemFailure>) {
    let results = join_all(
      cache
        .page_ids
        .iter()
        .map(|page_id| async move {
          (page_id, self.workspace.set_checkbox(page_id, false).await)
        }),
    )
    .await;

    let mut failures: Vec<ItemFailure> = results
      .into_iter()
      .filter_map(|(page_id, result)| {
        result.err().map(|e| ItemFailure {
          page_id: page_id.clone(),
          operation: ItemOperation::UncheckStatus,
          error: format!("{:#}", e),
        })
      })
      .collect();

    let strike_recorded = match self.measurements.record_strike_event() {
      Ok(()) => true,
      Err(e) => {
        failures.push(ItemFailure {
          page_id: self.root_page_id.clone(),
          operation: ItemOperation::RecordStrike,
          error: format!("{:#}", e),
        });
        false
      }
    };

    (strike_recorded, failures)
  }

  async fn stamp_last_modified(
    &self,
    changes: &[ItemChange],
    today: NaiveDate,
  ) -> Vec<ItemFailure> {
    let results = join_all(changes.iter().map(|change| async move {
      (
        &change.page_id,
        self.workspace.set_last_modified(&change.page_id, today).await,
      )
    }))
    .await;

    results
      .into_iter()
      .filter_map(|(page_id, result)| {
        result.err().map(|e| ItemFailure {
          page_id: page_id.clone(),
          operation: ItemOperation::StampLastModified,
          error: format!("{:#}", e),
        })
      })
      .collect()
  }

  /// Run the snapshot, diff, persist and reset stages against a validated cache.
  pub async fn sync_updates(&self, load: &CacheLoad) -> Result<SyncReport> {
    let snapshot = self.snapshot(&load.cache).await?;
    let all_checked = all_checked(&snapshot);
    let changes = self.diff(&snapshot)?;

    info!(
      pages = snapshot.len(),
      skipped = load.cache.page_ids.len() - snapshot.len(),
      changes = changes.len(),
      all_checked,
      "Diffed workspace against stored measurements"
    );
    if changes.is_empty() {
      info!("No pages to update");
    }

    let mut failures = self.persist(&changes);

    let mut strike_recorded = false;
    if all_checked {
      let (recorded, reset_failures) = self.reset_checkboxes(&load.cache).await;
      strike_recorded = recorded;
      failures.extend(reset_failures);
      info!(
        pages = load.cache.page_ids.len(),
        strike_recorded,
        "Every item checked, reset all checkboxes"
      );
    }

    let today = Utc::now().date_naive();
    failures.extend(self.stamp_last_modified(&changes, today).await);

    for failure in &failures {
      warn!(
        page_id = %failure.page_id,
        stage = %failure.operation.stage(),
        operation = %failure.operation,
        error = %failure.error,
        "Item write failed"
      );
    }

    Ok(SyncReport {
      cache_refreshed: load.refreshed,
      snapshot_size: snapshot.len(),
      changes,
      all_checked,
      strike_recorded,
      failures,
    })
  }

  /// Initialise, then run exactly one cycle.
  pub async fn run_once(&self) -> Result<SyncReport> {
    let load = self.initialize().await?;
    info!(
      root = %self.root_page_id,
      pages = load.cache.page_ids.len(),
      refreshed = load.refreshed,
      "Page ID cache ready"
    );
    self.sync_updates(&load).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{DateTime, Duration};
  use std::collections::{HashMap, HashSet};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  /// In-memory stand-in for the Notion API
  #[derive(Default)]
  struct FakeWorkspace {
    root_edited: Mutex<Option<DateTime<Utc>>>,
    databases: Mutex<Vec<(String, Vec<String>)>>,
    pages: Mutex<HashMap<String, RemoteItem>>,
    partial: HashSet<String>,
    failing_updates: HashSet<String>,
    root_unreachable: bool,
    enumerations: AtomicU32,
    checkbox_updates: Mutex<Vec<(String, bool)>>,
    date_updates: Mutex<Vec<(String, NaiveDate)>>,
  }

  impl FakeWorkspace {
    fn with_pages(items: &[(&str, f64, Option<bool>)]) -> Self {
      let fake = FakeWorkspace::default();
      fake.set_rows("db-1", items.iter().map(|(id, _, _)| *id).collect());
      for (id, value, checked) in items {
        fake.put_page(id, *value, *checked);
      }
      fake
    }

    fn set_rows(&self, database_id: &str, rows: Vec<&str>) {
      let rows = rows.into_iter().map(String::from).collect();
      let mut databases = self.databases.lock().unwrap();
      databases.retain(|(id, _)| id != database_id);
      databases.push((database_id.to_string(), rows));
    }

    fn put_page(&self, id: &str, value: f64, checked: Option<bool>) {
      self.pages.lock().unwrap().insert(
        id.to_string(),
        RemoteItem {
          id: id.to_string(),
          description: format!("Exercise {}", id),
          measurement_value: value,
          checkbox_state: checked,
        },
      );
    }

    fn touch_root(&self, at: DateTime<Utc>) {
      *self.root_edited.lock().unwrap() = Some(at);
    }

    fn enumerations(&self) -> u32 {
      self.enumerations.load(Ordering::SeqCst)
    }

    fn checkbox_updates(&self) -> Vec<(String, bool)> {
      let mut updates = self.checkbox_updates.lock().unwrap().clone();
      updates.sort_by(|a, b| a.0.cmp(&b.0));
      updates
    }

    fn stamped_pages(&self) -> Vec<String> {
      let mut pages: Vec<String> = self
        .date_updates
        .lock()
        .unwrap()
        .iter()
        .map(|(id, _)| id.clone())
        .collect();
      pages.sort();
      pages
    }
  }

  impl Workspace for FakeWorkspace {
    async fn block_last_edited(&self, _block_id: &str) -> Result<Option<DateTime<Utc>>> {
      if self.root_unreachable {
        return Err(eyre!("connection refused"));
      }
      Ok(*self.root_edited.lock().unwrap())
    }

    async fn child_database_ids(&self, _block_id: &str) -> Result<Vec<String>> {
      self.enumerations.fetch_add(1, Ordering::SeqCst);
      Ok(
        self
          .databases
          .lock()
          .unwrap()
          .iter()
          .map(|(id, _)| id.clone())
          .collect(),
      )
    }

    async fn database_page_ids(&self, database_id: &str) -> Result<Vec<String>> {
      Ok(
        self
          .databases
          .lock()
          .unwrap()
          .iter()
          .find(|(id, _)| id == database_id)
          .map(|(_, rows)| rows.clone())
          .unwrap_or_default(),
      )
    }

    async fn page(&self, page_id: &str) -> Result<Option<RemoteItem>> {
      if self.partial.contains(page_id) {
        return Ok(None);
      }
      self
        .pages
        .lock()
        .unwrap()
        .get(page_id)
        .cloned()
        .map(Some)
        .ok_or_else(|| eyre!("page {} not found", page_id))
    }

    async fn set_checkbox(&self, page_id: &str, checked: bool) -> Result<()> {
      if self.failing_updates.contains(page_id) {
        return Err(eyre!("rate limited"));
      }
      if let Some(page) = self.pages.lock().unwrap().get_mut(page_id) {
        page.checkbox_state = Some(checked);
      }
      self
        .checkbox_updates
        .lock()
        .unwrap()
        .push((page_id.to_string(), checked));
      Ok(())
    }

    async fn set_last_modified(&self, page_id: &str, date: NaiveDate) -> Result<()> {
      if self.failing_updates.contains(page_id) {
        return Err(eyre!("rate limited"));
      }
      self
        .date_updates
        .lock()
        .unwrap()
        .push((page_id.to_string(), date));
      Ok(())
    }
  }

  /// SQLite measurements that refuse writes for chosen identifiers
  struct FailingMeasurements {
    inner: SqliteMeasurements,
    failing_upserts: HashSet<String>,
    fail_strikes: bool,
  }

  impl MeasurementStore for FailingMeasurements {
    fn get_last_updated(&self, identifier: &str) -> Result<Option<DateTime<Utc>>> {
      self.inner.get_last_updated(identifier)
    }

    fn get_latest_measurement_value(&self, identifier: &str) -> Result<Option<f64>> {
      self.inner.get_latest_measurement_value(identifier)
    }

    fn upsert_measurement(
      &self,
      identifier: &str,
      description: &str,
      measurement: &Measurement,
    ) -> Result<()> {
      if self.failing_upserts.contains(identifier) {
        return Err(eyre!("disk full"));
      }
      self.inner.upsert_measurement(identifier, description, measurement)
    }

    fn record_strike_event(&self) -> Result<()> {
      if self.fail_strikes {
        return Err(eyre!("disk full"));
      }
      self.inner.record_strike_event()
    }
  }

  type TestSynchronizer = Synchronizer<FakeWorkspace, SqliteStorage, SqliteMeasurements>;

  fn synchronizer(workspace: FakeWorkspace) -> TestSynchronizer {
    let db = Arc::new(Database::open_in_memory().unwrap());
    Synchronizer::new(
      workspace,
      "root",
      SqliteStorage::new(Arc::clone(&db), "root"),
      SqliteMeasurements::new(db),
    )
  }

  fn item(id: &str, value: f64, checked: Option<bool>) -> RemoteItem {
    RemoteItem {
      id: id.to_string(),
      description: String::new(),
      measurement_value: value,
      checkbox_state: checked,
    }
  }

  #[test]
  fn test_all_checked_empty_snapshot() {
    assert!(all_checked(&[]));
  }

  #[test]
  fn test_all_checked_any_false() {
    let snapshot = [item("a", 1.0, Some(true)), item("b", 1.0, Some(false))];
    assert!(!all_checked(&snapshot));
  }

  #[test]
  fn test_all_checked_all_true() {
    let snapshot = [item("a", 1.0, Some(true)), item("b", 1.0, Some(true))];
    assert!(all_checked(&snapshot));
  }

  #[test]
  fn test_all_checked_ignores_non_checkbox_status() {
    let snapshot = [item("a", 1.0, Some(true)), item("b", 1.0, None)];
    assert!(all_checked(&snapshot));
  }

  #[test]
  fn test_needs_update() {
    assert!(needs_update(None, 0.0));
    assert!(needs_update(Some(5.0), 6.0));
    assert!(!needs_update(Some(5.0), 5.0));
  }

  #[test]
  fn test_report_without_failures_is_ok() {
    assert!(SyncReport::default().into_result().is_ok());
  }

  #[test]
  fn test_report_with_failures_lists_items() {
    let report = SyncReport {
      failures: vec![ItemFailure {
        page_id: "p9".to_string(),
        operation: ItemOperation::StampLastModified,
        error: "timeout".to_string(),
      }],
      ..SyncReport::default()
    };
    let err = report.into_result().unwrap_err().to_string();
    assert!(err.contains("stamp last modified p9: timeout"));
  }

  #[tokio::test]
  async fn test_first_cycle_end_to_end() {
    let sync = synchronizer(FakeWorkspace::with_pages(&[
      ("p1", 5.0, Some(true)),
      ("p2", 10.0, Some(true)),
    ]));

    let report = sync.run_once().await.unwrap();

    assert!(report.cache_refreshed);
    assert_eq!(sync.workspace().enumerations(), 1);
    assert_eq!(
      sync.cache().storage().read_cache().unwrap().unwrap().page_ids,
      vec!["p1", "p2"]
    );

    assert_eq!(report.snapshot_size, 2);
    let changed: Vec<&str> = report.changes.iter().map(|c| c.page_id.as_str()).collect();
    assert_eq!(changed, vec!["p1", "p2"]);
    assert!(report.changes.iter().all(|c| c.previous_value.is_none()));

    for (id, value) in [("p1", 5.0), ("p2", 10.0)] {
      let record = sync.measurements().get_record(id).unwrap().unwrap();
      assert_eq!(record.measurements.len(), 1);
      assert_eq!(record.measurements[0].value, value);
      assert_eq!(record.description, format!("Exercise {}", id));
    }

    assert!(report.all_checked);
    assert!(report.strike_recorded);
    assert_eq!(sync.measurements().strike_count().unwrap(), 1);
    assert_eq!(
      sync.workspace().checkbox_updates(),
      vec![("p1".to_string(), false), ("p2".to_string(), false)]
    );
    assert_eq!(sync.workspace().stamped_pages(), vec!["p1", "p2"]);
    assert!(!report.has_failures());
  }

  #[tokio::test]
  async fn test_second_cycle_is_idempotent() {
    let sync = synchronizer(FakeWorkspace::with_pages(&[
      ("p1", 5.0, Some(true)),
      ("p2", 10.0, Some(false)),
    ]));
    sync.workspace().touch_root(Utc::now() - Duration::days(1));

    sync.run_once().await.unwrap();
    let report = sync.run_once().await.unwrap();

    assert!(!report.cache_refreshed);
    assert_eq!(sync.workspace().enumerations(), 1);
    assert!(report.changes.is_empty());
    assert!(!report.all_checked);
    assert!(!report.strike_recorded);
    assert_eq!(sync.measurements().strike_count().unwrap(), 0);
    assert_eq!(
      sync.measurements().get_record("p1").unwrap().unwrap().measurements.len(),
      1
    );
  }

  #[tokio::test]
  async fn test_changed_value_appends_only_that_item() {
    let sync = synchronizer(FakeWorkspace::with_pages(&[
      ("p1", 5.0, Some(false)),
      ("p2", 10.0, Some(false)),
    ]));
    sync.run_once().await.unwrap();

    sync.workspace().put_page("p2", 12.0, Some(false));
    let report = sync.run_once().await.unwrap();

    assert_eq!(
      report.changes,
      vec![ItemChange {
        page_id: "p2".to_string(),
        description: "Exercise p2".to_string(),
        previous_value: Some(10.0),
        value: 12.0,
      }]
    );
    let values: Vec<f64> = sync
      .measurements()
      .get_record("p2")
      .unwrap()
      .unwrap()
      .measurements
      .iter()
      .map(|m| m.value)
      .collect();
    assert_eq!(values, vec![10.0, 12.0]);
    assert_eq!(
      sync.measurements().get_record("p1").unwrap().unwrap().measurements.len(),
      1
    );
  }

  #[tokio::test]
  async fn test_root_edit_after_cache_forces_refresh() {
    let workspace = FakeWorkspace::with_pages(&[("p1", 1.0, Some(false))]);
    let sync = synchronizer(workspace);
    sync.run_once().await.unwrap();

    sync.workspace().put_page("p2", 2.0, Some(false));
    sync.workspace().set_rows("db-1", vec!["p1", "p2"]);
    sync.workspace().touch_root(Utc::now() + Duration::seconds(5));

    let report = sync.run_once().await.unwrap();

    assert!(report.cache_refreshed);
    assert_eq!(sync.workspace().enumerations(), 2);
    assert_eq!(report.snapshot_size, 2);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].page_id, "p2");
  }

  #[tokio::test]
  async fn test_rows_added_without_root_edit_stay_invisible() {
    let sync = synchronizer(FakeWorkspace::with_pages(&[("p1", 1.0, Some(false))]));
    sync.workspace().touch_root(Utc::now() - Duration::hours(1));
    sync.run_once().await.unwrap();

    sync.workspace().put_page("p2", 2.0, Some(false));
    sync.workspace().set_rows("db-1", vec!["p1", "p2"]);

    let report = sync.run_once().await.unwrap();

    assert!(!report.cache_refreshed);
    assert_eq!(report.snapshot_size, 1);
    assert_eq!(sync.measurements().get_record("p2").unwrap(), None);
  }

  #[tokio::test]
  async fn test_emptied_cache_recovers_on_next_run() {
    let sync = synchronizer(FakeWorkspace::with_pages(&[("p1", 1.0, Some(false))]));
    sync.workspace().touch_root(Utc::now() - Duration::hours(1));
    sync.run_once().await.unwrap();

    // Simulates a crash between delete and write
    sync.cache().storage().delete_all_cache().unwrap();

    let load = sync.initialize().await.unwrap();
    assert!(load.refreshed);
    assert_eq!(load.cache.page_ids, vec!["p1"]);
  }

  #[tokio::test]
  async fn test_partial_pages_are_skipped() {
    let mut workspace = FakeWorkspace::with_pages(&[
      ("p1", 1.0, Some(true)),
      ("p2", 2.0, Some(false)),
    ]);
    workspace.partial.insert("p2".to_string());
    let sync = synchronizer(workspace);

    let report = sync.run_once().await.unwrap();

    assert_eq!(report.snapshot_size, 1);
    assert_eq!(report.changes.len(), 1);
    // The only visible item is checked, so every cached page gets reset
    assert!(report.all_checked);
    assert_eq!(sync.workspace().checkbox_updates().len(), 2);
  }

  #[tokio::test]
  async fn test_empty_workspace_counts_as_all_checked() {
    let sync = synchronizer(FakeWorkspace::default());

    let report = sync.run_once().await.unwrap();

    assert_eq!(report.snapshot_size, 0);
    assert!(report.all_checked);
    assert!(report.strike_recorded);
    assert!(sync.workspace().checkbox_updates().is_empty());
  }

  #[tokio::test]
  async fn test_per_item_failures_are_reported() {
    let mut workspace = FakeWorkspace::with_pages(&[
      ("p1", 1.0, Some(true)),
      ("p2", 2.0, Some(true)),
    ]);
    workspace.failing_updates.insert("p2".to_string());
    let sync = synchronizer(workspace);

    let report = sync.run_once().await.unwrap();

    let failed: Vec<(&str, ItemOperation)> = report
      .failures
      .iter()
      .map(|f| (f.page_id.as_str(), f.operation))
      .collect();
    assert_eq!(
      failed,
      vec![
        ("p2", ItemOperation::UncheckStatus),
        ("p2", ItemOperation::StampLastModified)
      ]
    );
    assert_eq!(sync.workspace().stamped_pages(), vec!["p1"]);
    assert_eq!(
      sync.measurements().get_record("p2").unwrap().unwrap().measurements.len(),
      1
    );
    assert!(report.strike_recorded);
    assert!(report.into_result().is_err());
  }

  #[tokio::test]
  async fn test_store_failures_are_reported() {
    let workspace = FakeWorkspace::with_pages(&[
      ("p1", 1.0, Some(true)),
      ("p2", 2.0, Some(true)),
      ("p3", 3.0, Some(true)),
    ]);
    let db = Arc::new(Database::open_in_memory().unwrap());
    let sync = Synchronizer::new(
      workspace,
      "root",
      SqliteStorage::new(Arc::clone(&db), "root"),
      FailingMeasurements {
        inner: SqliteMeasurements::new(db),
        failing_upserts: HashSet::from(["p2".to_string()]),
        fail_strikes: true,
      },
    );

    let report = sync.run_once().await.unwrap();

    let failed: Vec<(&str, ItemOperation)> = report
      .failures
      .iter()
      .map(|f| (f.page_id.as_str(), f.operation))
      .collect();
    assert_eq!(
      failed,
      vec![("p2", ItemOperation::Persist), ("root", ItemOperation::RecordStrike)]
    );
    assert!(report.all_checked);
    assert!(!report.strike_recorded);

    let store = &sync.measurements().inner;
    assert_eq!(store.get_latest_measurement_value("p1").unwrap(), Some(1.0));
    assert_eq!(store.get_latest_measurement_value("p2").unwrap(), None);
    assert_eq!(store.get_latest_measurement_value("p3").unwrap(), Some(3.0));
    assert_eq!(store.strike_count().unwrap(), 0);

    assert_eq!(
      sync.workspace().checkbox_updates(),
      vec![
        ("p1".to_string(), false),
        ("p2".to_string(), false),
        ("p3".to_string(), false)
      ]
    );
    let stamped = sync.workspace().stamped_pages();
    assert!(stamped.contains(&"p1".to_string()));
    assert!(stamped.contains(&"p3".to_string()));
    assert!(report.into_result().is_err());
  }

  #[tokio::test]
  async fn test_unreachable_root_aborts_before_writes() {
    let workspace = FakeWorkspace {
      root_unreachable: true,
      ..FakeWorkspace::with_pages(&[("p1", 1.0, Some(true))])
    };
    let sync = synchronizer(workspace);

    let err = sync.run_once().await.unwrap_err();

    assert!(format!("{:#}", err).contains("cache validation"));
    assert_eq!(sync.workspace().enumerations(), 0);
    assert_eq!(sync.cache().storage().read_cache().unwrap(), None);
    assert_eq!(sync.measurements().get_record("p1").unwrap(), None);
  }

  #[tokio::test]
  async fn test_missing_page_aborts_snapshot() {
    let workspace = FakeWorkspace::with_pages(&[("p1", 1.0, Some(true))]);
    workspace.set_rows("db-1", vec!["p1", "ghost"]);
    let sync = synchronizer(workspace);

    let err = sync.run_once().await.unwrap_err();

    assert!(format!("{:#}", err).contains("snapshot"));
    assert_eq!(sync.measurements().get_record("p1").unwrap(), None);
    assert_eq!(sync.measurements().strike_count().unwrap(), 0);
  }
}
