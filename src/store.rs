use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use rusqlite::{params, params_from_iter, types::ValueRef, Connection, Transaction};
use tracing::{debug, info, warn};

use crate::{
    error::{ManifestError, Result},
    record::{id_from_hash, ManifestRow},
};

// Stays well below SQLITE_MAX_VARIABLE_NUMBER on old builds.
const ID_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct RawRow {
    pub id: i64,
    pub blob: Vec<u8>,
}

impl RawRow {
    pub fn decode(&self) -> Result<ManifestRow> {
        ManifestRow::decode(self.id, &self.blob)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// SQLite-backed manifest row store.
///
/// The connection is opened on first use and cached. Every access re-checks that the
/// database file still exists, so a deleted manifest is reported instead of silently
/// recreated as an empty file.
pub struct RowStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl RowStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Moves `staged` over the database file. The connection lock is held across the
    /// rename, so no reader can open or keep using the old file once this returns.
    pub fn replace_file(&self, staged: &Path) -> Result<()> {
        let mut guard = self.lock();
        if guard.take().is_some() {
            debug!(path = %self.path.display(), "Closed manifest connection before swap");
        }
        fs::rename(staged, &self.path)?;
        info!(path = %self.path.display(), "Swapped in new manifest database");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        if !self.exists() {
            if guard.take().is_some() {
                warn!(path = %self.path.display(), "Manifest database disappeared, dropping connection");
            }
            return Err(ManifestError::ManifestUnavailable(self.path.clone()));
        }

        let conn = match guard.take() {
            Some(conn) => conn,
            None => {
                let conn = Connection::open(&self.path)?;
                conn.busy_timeout(Duration::from_secs(5))?;
                info!(path = %self.path.display(), "Opened manifest database");
                conn
            }
        };
        f(guard.insert(conn))
    }

    /// Read-only access for queries against derived tables.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| f(conn))
    }

    /// Runs `f` inside one transaction; the store lock is held from begin to commit.
    pub fn write_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Looks the table up in the schema catalog on every call.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_conn(|conn| table_exists(conn, table))
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        self.with_conn(|conn| {
            ensure_table(conn, table)?;
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as u64)
        })
    }

    /// Loads a whole (small) table, or only its first `limit` rows.
    pub fn scan(&self, table: &str, limit: Option<usize>) -> Result<Vec<RawRow>> {
        self.with_conn(|conn| {
            ensure_table(conn, table)?;
            let limit = limit.map(|v| v as i64).unwrap_or(-1);
            let mut stmt = conn.prepare(&format!(
                "SELECT id, json FROM \"{table}\" ORDER BY rowid LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], raw_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Pages through `table` `window` rows at a time until an empty page comes back.
    ///
    /// The store lock is only held while a page is fetched, so other readers can
    /// interleave with a long scan. Cancellation is checked before each fetch.
    /// Returns the number of rows handed to `on_row`.
    pub fn scan_windowed(
        &self,
        table: &str,
        window: usize,
        cancel: &CancelFlag,
        mut on_row: impl FnMut(RawRow),
    ) -> Result<u64> {
        if !self.table_exists(table)? {
            return Err(ManifestError::MissingTable(table.to_string()));
        }

        let window = window.max(1);
        let sql = format!("SELECT id, json FROM \"{table}\" ORDER BY rowid LIMIT ?1 OFFSET ?2");
        let mut offset = 0_u64;
        loop {
            if cancel.is_cancelled() {
                info!(table, offset, "Windowed scan cancelled");
                return Err(ManifestError::Cancelled);
            }

            let page = self.with_conn(|conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![window as i64, offset as i64], raw_row)?;
                let mut page = Vec::with_capacity(window);
                for row in rows {
                    page.push(row?);
                }
                Ok(page)
            })?;

            if page.is_empty() {
                debug!(table, rows = offset, "Windowed scan finished");
                return Ok(offset);
            }

            offset += page.len() as u64;
            for row in page {
                on_row(row);
            }
        }
    }

    /// Fetches the rows whose hash is in `hashes`.
    pub fn query_by_ids(&self, table: &str, hashes: &[u32]) -> Result<Vec<RawRow>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            ensure_table(conn, table)?;
            let mut out = Vec::new();
            for chunk in hashes.chunks(ID_CHUNK_SIZE) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, json FROM \"{table}\" WHERE id IN ({placeholders})"
                ))?;
                let rows = stmt.query_map(
                    params_from_iter(chunk.iter().map(|hash| id_from_hash(*hash))),
                    raw_row,
                )?;
                for row in rows {
                    out.push(row?);
                }
            }
            Ok(out)
        })
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

fn ensure_table(conn: &Connection, table: &str) -> Result<()> {
    if table_exists(conn, table)? {
        Ok(())
    } else {
        Err(ManifestError::MissingTable(table.to_string()))
    }
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    let id: i64 = row.get(0)?;
    let blob = match row.get_ref(1)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
        _ => Vec::new(),
    };
    Ok(RawRow { id, blob })
}
