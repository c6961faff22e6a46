//! Syncs exercise tracking pages from a Notion workspace into a SQLite time series.
//!
//! Each run validates a cached list of tracked page IDs against the root
//! page, snapshots every tracked page, appends changed values to the
//! measurement store and resets the workspace for the next cycle.

pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod measurements;
pub mod notion;
pub mod sync;

pub use config::Config;
pub use sync::{NotionSynchronizer, SyncReport, Synchronizer};
