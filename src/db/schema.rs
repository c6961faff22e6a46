/// Schema for the page ID cache, measurement series and strike log.
pub const SCHEMA: &str = r#"
-- Cached enumeration of tracked pages, one record per root
CREATE TABLE IF NOT EXISTS page_id_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_key TEXT NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_id_cache_root ON page_id_cache(root_key);

-- Cached page IDs (preserves enumeration order)
CREATE TABLE IF NOT EXISTS page_id_cache_entries (
    cache_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    page_id TEXT NOT NULL,
    PRIMARY KEY (cache_id, position)
);

-- One row per tracked exercise, keyed by page ID
CREATE TABLE IF NOT EXISTS exercise_data (
    page_id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    last_updated_date TEXT NOT NULL
);

-- Append-only measurement series
CREATE TABLE IF NOT EXISTS measurements (
    page_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    measured_at TEXT NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY (page_id, position),
    FOREIGN KEY (page_id) REFERENCES exercise_data(page_id)
);

CREATE TABLE IF NOT EXISTS strike_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strike_date TEXT NOT NULL
);
"#;
