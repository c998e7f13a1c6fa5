//! Versioned storage backends: the `CacheStorage` trait, SQLite and in-memory.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::http::{CachedResponse, RequestIdentity};

type Result<T> = std::result::Result<T, StoreError>;

/// Summary of one stored cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
  pub version: String,
  pub entries: usize,
  pub created_at: DateTime<Utc>,
}

/// Trait for versioned response storage backends.
///
/// Every version is an independent key-value map from request identity to a
/// complete response. Writes replace whole entries; nothing is ever
/// partially updated.
pub trait CacheStorage: Send + Sync {
  /// Create the version if it does not exist yet.
  fn open(&self, version: &str) -> Result<()>;

  /// Look up a response. Returns an independent copy.
  fn get(&self, version: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>>;

  /// Store a response, replacing any previous entry for the identity.
  fn put(&self, version: &str, identity: &RequestIdentity, response: &CachedResponse)
    -> Result<()>;

  /// Store several responses at once: either all are written or none.
  fn put_all(&self, version: &str, entries: &[(RequestIdentity, CachedResponse)]) -> Result<()>;

  /// Delete a whole version. Returns whether it existed.
  fn delete(&self, version: &str) -> Result<bool>;

  /// All existing versions, oldest first.
  fn versions(&self) -> Result<Vec<VersionInfo>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

struct MemoryVersion {
  created_at: DateTime<Utc>,
  entries: HashMap<String, CachedResponse>,
}

impl MemoryVersion {
  fn new() -> Self {
    Self {
      created_at: Utc::now(),
      entries: HashMap::new(),
    }
  }
}

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  versions: Mutex<HashMap<String, MemoryVersion>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryVersion>>> {
    self.versions.lock().map_err(|_| StoreError::Poisoned)
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, version: &str) -> Result<()> {
    self
      .lock()?
      .entry(version.to_string())
      .or_insert_with(MemoryVersion::new);
    Ok(())
  }

  fn get(&self, version: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .lock()?
        .get(version)
        .and_then(|v| v.entries.get(&identity.cache_hash()))
        .cloned(),
    )
  }

  fn put(
    &self,
    version: &str,
    identity: &RequestIdentity,
    response: &CachedResponse,
  ) -> Result<()> {
    self
      .lock()?
      .entry(version.to_string())
      .or_insert_with(MemoryVersion::new)
      .entries
      .insert(identity.cache_hash(), response.clone());
    Ok(())
  }

  fn put_all(&self, version: &str, entries: &[(RequestIdentity, CachedResponse)]) -> Result<()> {
    let mut versions = self.lock()?;
    let slot = versions
      .entry(version.to_string())
      .or_insert_with(MemoryVersion::new);
    for (identity, response) in entries {
      slot.entries.insert(identity.cache_hash(), response.clone());
    }
    Ok(())
  }

  fn delete(&self, version: &str) -> Result<bool> {
    Ok(self.lock()?.remove(version).is_some())
  }

  fn versions(&self) -> Result<Vec<VersionInfo>> {
    let mut infos: Vec<VersionInfo> = self
      .lock()?
      .iter()
      .map(|(name, v)| VersionInfo {
        version: name.clone(),
        entries: v.entries.len(),
        created_at: v.created_at,
      })
      .collect();
    infos.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.version.cmp(&b.version))
    });
    Ok(infos)
  }
}

// ============================================================================
// SQLite backend
// ============================================================================

/// SQLite-based response storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (creating if needed) the database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Unavailable(format!(
          "failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("offgrid").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StoreError::Poisoned)
  }

  fn run_migrations(&self) -> Result<()> {
    self.lock()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_versions (
    version TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cached_responses (
    version TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (version, request_key)
);
"#;

const UPSERT_RESPONSE: &str =
  "INSERT OR REPLACE INTO cached_responses (version, request_key, method, url, status, headers, body, cached_at)
   VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))";

fn ensure_version(conn: &Connection, version: &str) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO cache_versions (version) VALUES (?)",
    params![version],
  )?;
  Ok(())
}

fn upsert(
  conn: &Connection,
  version: &str,
  identity: &RequestIdentity,
  response: &CachedResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)?;
  conn.execute(
    UPSERT_RESPONSE,
    params![
      version,
      identity.cache_hash(),
      identity.method(),
      identity.url(),
      response.status,
      headers,
      response.body,
    ],
  )?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, version: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_version(&conn, version)
  }

  fn get(&self, version: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cached_responses
         WHERE version = ? AND request_key = ?",
        params![version, identity.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body)) => Ok(Some(CachedResponse {
        status,
        headers: serde_json::from_str(&headers)?,
        body,
      })),
      None => Ok(None),
    }
  }

  fn put(
    &self,
    version: &str,
    identity: &RequestIdentity,
    response: &CachedResponse,
  ) -> Result<()> {
    let conn = self.lock()?;
    let tx = conn.unchecked_transaction()?;
    ensure_version(&tx, version)?;
    upsert(&tx, version, identity, response)?;
    tx.commit()?;
    Ok(())
  }

  fn put_all(&self, version: &str, entries: &[(RequestIdentity, CachedResponse)]) -> Result<()> {
    let conn = self.lock()?;
    let tx = conn.unchecked_transaction()?;
    ensure_version(&tx, version)?;
    for (identity, response) in entries {
      upsert(&tx, version, identity, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn delete(&self, version: &str) -> Result<bool> {
    let conn = self.lock()?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
      "DELETE FROM cached_responses WHERE version = ?",
      params![version],
    )?;
    let removed = tx.execute(
      "DELETE FROM cache_versions WHERE version = ?",
      params![version],
    )?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn versions(&self) -> Result<Vec<VersionInfo>> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(
      "SELECT v.version, v.created_at, COUNT(r.request_key)
       FROM cache_versions v
       LEFT JOIN cached_responses r ON r.version = v.version
       GROUP BY v.version, v.created_at
       ORDER BY v.created_at, v.version",
    )?;

    let rows: Vec<(String, String, i64)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
      .collect::<std::result::Result<_, _>>()?;

    rows
      .into_iter()
      .map(|(version, created_at, entries)| {
        Ok(VersionInfo {
          version,
          entries: usize::try_from(entries).unwrap_or_default(),
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Unavailable(format!("failed to parse datetime '{}': {}", s, e)))
}
