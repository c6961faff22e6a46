//! Notion workspace access.

mod api_types;
mod client;
mod types;

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::Result;
use std::future::Future;

pub use client::NotionClient;
pub use types::RemoteItem;

/// The workspace operations a sync cycle needs.
pub trait Workspace: Send + Sync {
  /// Last edit time of a block, `None` if the block came back partial.
  fn block_last_edited(
    &self,
    block_id: &str,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;

  /// IDs of the child databases directly under a block.
  fn child_database_ids(&self, block_id: &str)
    -> impl Future<Output = Result<Vec<String>>> + Send;

  /// IDs of every row in a database.
  fn database_page_ids(
    &self,
    database_id: &str,
  ) -> impl Future<Output = Result<Vec<String>>> + Send;

  /// A tracked page, `None` if it is not fully loaded.
  fn page(&self, page_id: &str) -> impl Future<Output = Result<Option<RemoteItem>>> + Send;

  fn set_checkbox(&self, page_id: &str, checked: bool)
    -> impl Future<Output = Result<()>> + Send;

  fn set_last_modified(
    &self,
    page_id: &str,
    date: NaiveDate,
  ) -> impl Future<Output = Result<()>> + Send;
}
