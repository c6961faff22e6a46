//! Page ID caching for the tracked workspace.
//!
//! Enumerating every child database under the root is expensive, so the
//! resulting list of page IDs is stored and reused until the root page
//! reports an edit newer than the stored list.

mod layer;
mod storage;
mod traits;

pub use layer::{comes_after, CacheLayer};
pub use storage::SqliteStorage;
pub use traits::{CacheResult, CacheSource, CachedPageIdSet, PageIdCache};
