//! SQLite-backed cache storage.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::debug;

use crate::db::Database;
use crate::error::FeedResult;
use crate::http::{Request, Response};

/// All named caches of the origin.
#[derive(Clone)]
pub struct CacheStorage {
  db: Arc<Database>,
}

impl CacheStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Open a cache, creating it if it does not exist yet.
  pub fn open(&self, name: &str) -> FeedResult<Cache> {
    let conn = self.db.conn()?;
    conn.execute(
      "INSERT OR IGNORE INTO cache_names (name, created_seq)
       VALUES (?, (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM cache_names))",
      params![name],
    )?;

    Ok(Cache {
      db: Arc::clone(&self.db),
      name: name.to_string(),
    })
  }

  pub fn has(&self, name: &str) -> FeedResult<bool> {
    let conn = self.db.conn()?;
    let exists: bool = conn.query_row(
      "SELECT EXISTS(SELECT 1 FROM cache_names WHERE name = ?)",
      params![name],
      |row| row.get(0),
    )?;
    Ok(exists)
  }

  /// Cache names in creation order.
  pub fn keys(&self) -> FeedResult<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_names ORDER BY created_seq")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  /// Delete a cache and every entry in it. Returns whether it existed.
  pub fn delete(&self, name: &str) -> FeedResult<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_entries WHERE cache_name = ?", params![name])?;
    let removed = tx.execute("DELETE FROM cache_names WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  /// Look a request up in every cache, oldest cache first.
  pub fn match_any(&self, request: &Request) -> FeedResult<Option<Response>> {
    let conn = self.db.conn()?;
    let response = conn
      .query_row(
        "SELECT e.status, e.url, e.headers, e.body FROM cache_entries e
         INNER JOIN cache_names n ON n.name = e.cache_name
         WHERE e.request_key = ?
         ORDER BY n.created_seq
         LIMIT 1",
        params![request.cache_key()],
        read_response,
      )
      .optional()?;
    Ok(response)
  }
}

/// One named cache.
#[derive(Clone)]
pub struct Cache {
  db: Arc<Database>,
  name: String,
}

impl Cache {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Store a response for a request, replacing any earlier entry.
  ///
  /// The response is consumed: pass a clone if the caller still needs to
  /// read it. A replaced entry becomes the newest.
  pub fn put(&self, request: &Request, response: Response) -> FeedResult<()> {
    self.put_all(vec![(request.clone(), response)])
  }

  /// Store a batch in a single transaction; either all entries land or none.
  pub fn put_all(&self, entries: Vec<(Request, Response)>) -> FeedResult<()> {
    let mut rows = Vec::with_capacity(entries.len());
    for (request, mut response) in entries {
      let headers = serde_json::to_string(response.headers())?;
      let body = response.bytes()?;
      rows.push((request.cache_key(), response.status(), headers, response.url().to_string(), body));
    }

    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    for (key, status, headers, url, body) in &rows {
      insert_entry(&tx, &self.name, key, *status, headers, url, body)?;
    }
    tx.commit()?;

    debug!(cache = %self.name, count = rows.len(), "Cached responses");
    Ok(())
  }

  pub fn match_request(&self, request: &Request) -> FeedResult<Option<Response>> {
    self.match_key(&request.cache_key())
  }

  pub fn match_key(&self, key: &str) -> FeedResult<Option<Response>> {
    let conn = self.db.conn()?;
    let response = conn
      .query_row(
        "SELECT status, url, headers, body FROM cache_entries
         WHERE cache_name = ? AND request_key = ?",
        params![self.name, key],
        read_response,
      )
      .optional()?;
    Ok(response)
  }

  /// Request identities in insertion order, oldest first.
  pub fn keys(&self) -> FeedResult<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt =
      conn.prepare("SELECT request_key FROM cache_entries WHERE cache_name = ? ORDER BY seq")?;
    let keys = stmt
      .query_map(params![self.name], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }

  pub fn delete(&self, key: &str) -> FeedResult<bool> {
    let conn = self.db.conn()?;
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE cache_name = ? AND request_key = ?",
      params![self.name, key],
    )?;
    Ok(removed > 0)
  }

  pub fn len(&self) -> FeedResult<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?",
      params![self.name],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  pub fn is_empty(&self) -> FeedResult<bool> {
    Ok(self.len()? == 0)
  }

  /// Remove the oldest entry until at most `max_items` remain.
  /// Returns how many entries were removed.
  pub fn trim(&self, max_items: usize) -> FeedResult<usize> {
    let mut removed = 0;
    loop {
      let keys = self.keys()?;
      if keys.len() <= max_items {
        break;
      }
      self.delete(&keys[0])?;
      removed += 1;
    }

    if removed > 0 {
      debug!(cache = %self.name, removed, max_items, "Trimmed cache");
    }
    Ok(removed)
  }
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  key: &str,
  status: u16,
  headers: &str,
  url: &str,
  body: &[u8],
) -> FeedResult<()> {
  conn.execute(
    "INSERT OR REPLACE INTO cache_entries (cache_name, request_key, status, headers, url, body)
     VALUES (?, ?, ?, ?, ?, ?)",
    params![cache_name, key, status, headers, url, body],
  )?;
  Ok(())
}

fn read_response(row: &Row<'_>) -> rusqlite::Result<Response> {
  let status: u16 = row.get(0)?;
  let url: String = row.get(1)?;
  let headers: String = row.get(2)?;
  let body: Vec<u8> = row.get(3)?;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers).unwrap_or_default();
  Ok(Response::new(status, url, headers, body))
}
