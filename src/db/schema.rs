/// Schema for the platform database.
///
/// Holds the state a browser keeps per origin and shares between the page
/// and the worker: named HTTP caches, background-sync registrations,
/// notification permission and the push subscription.
pub const SCHEMA: &str = r#"
-- Named cache partitions, in creation order
CREATE TABLE IF NOT EXISTS cache_names (
    name TEXT PRIMARY KEY,
    created_seq INTEGER NOT NULL
);

-- Request identity -> response snapshot, seq is insertion order
CREATE TABLE IF NOT EXISTS cache_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    url TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (cache_name, request_key),
    FOREIGN KEY (cache_name) REFERENCES cache_names(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_name ON cache_entries(cache_name, seq);

-- Pending background-sync registrations
CREATE TABLE IF NOT EXISTS sync_registrations (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now')),
    -- Bumped by every registration of a tag that is already pending
    generation INTEGER NOT NULL DEFAULT 0
);

-- Single-row key/value platform settings (permission, subscription)
CREATE TABLE IF NOT EXISTS platform_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
