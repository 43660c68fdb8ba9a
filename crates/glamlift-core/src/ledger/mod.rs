//! Durable per-record migration state.
//!
//! Every record's progress lives in a single SQLite database so a run can
//! stop at any point (crash, Ctrl-C, network loss) and resume without
//! repeating remote work. Progress only moves forward: re-importing the
//! catalog refreshes descriptive fields but never resets remote ids or
//! status, and a late status write can never downgrade an earlier one.
//! The two deliberate exceptions are [`Ledger::reset_failed`], which
//! requeues failed records, and [`Ledger::set_verified`], which lets an
//! audit correct the completeness flag in either direction.

use crate::catalog::CatalogRecord;
use crate::error::{GlamliftError, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Where a record stands in the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Nothing has happened yet.
    NotStarted,
    /// The upload itself failed; nothing is on the remote.
    Failed,
    /// The file is on the remote but metadata has not been reconciled.
    Uploaded,
    /// Some metadata commands failed; the rest landed.
    MetadataPartial,
    /// File and all metadata are on the remote.
    MetadataComplete,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::NotStarted => "not_started",
            MigrationState::Failed => "failed",
            MigrationState::Uploaded => "uploaded",
            MigrationState::MetadataPartial => "metadata_partial",
            MigrationState::MetadataComplete => "metadata_complete",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "not_started" => Some(MigrationState::NotStarted),
            "failed" => Some(MigrationState::Failed),
            "uploaded" => Some(MigrationState::Uploaded),
            "metadata_partial" => Some(MigrationState::MetadataPartial),
            "metadata_complete" => Some(MigrationState::MetadataComplete),
            _ => None,
        }
    }

    /// Position in the forward-only ordering.
    fn rank(&self) -> u8 {
        match self {
            MigrationState::NotStarted => 0,
            MigrationState::Failed => 1,
            MigrationState::Uploaded => 2,
            MigrationState::MetadataPartial => 3,
            MigrationState::MetadataComplete => 4,
        }
    }

    /// The later of two states; writes never move a record backwards.
    fn advance(current: Self, target: Self) -> Self {
        if target.rank() > current.rank() {
            target
        } else {
            current
        }
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromSql for MigrationState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MigrationState::parse(text).ok_or_else(|| {
            FromSqlError::Other(format!("unknown migration state '{}'", text).into())
        })
    }
}

impl ToSql for MigrationState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A record plus its migration tracking fields.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub record: CatalogRecord,
    /// Canonical file page URL once uploaded.
    pub remote_file_ref: Option<String>,
    /// MediaInfo entity id once resolved.
    pub remote_entity_id: Option<String>,
    pub metadata_complete: bool,
    pub status: MigrationState,
    pub failure_reason: Option<String>,
    pub updated_at: String,
}

/// Counts per migration state, for the status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub not_started: usize,
    pub failed: usize,
    pub uploaded: usize,
    pub metadata_partial: usize,
    pub metadata_complete: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.not_started
            + self.failed
            + self.uploaded
            + self.metadata_partial
            + self.metadata_complete
    }
}

const SELECT_COLUMNS: &str = "unique_id, title, creator, description, date, dimensions, \
     object_type, accession, original_citation, image_url, detail_url, \
     categories, local_path, target_filename, remote_file_ref, \
     remote_entity_id, metadata_complete, status, failure_reason, updated_at";

/// SQLite-backed migration ledger.
#[derive(Clone)]
pub struct Ledger {
    db_path: PathBuf,
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    /// Open (or create) the ledger at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GlamliftError::Io {
                    message: format!("Failed to create ledger directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| GlamliftError::Database {
            message: format!("Failed to open ledger database: {}", e),
            source: Some(e),
        })?;

        // WAL keeps the ledger readable while a run is writing to it
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             PRAGMA busy_timeout=5000; \
             PRAGMA temp_store=MEMORY;",
        )
        .map_err(|e| GlamliftError::Database {
            message: format!("Failed to set pragmas: {}", e),
            source: Some(e),
        })?;

        Self::init_schema(&conn)?;
        Self::ensure_columns(&conn)?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Path the ledger was opened at.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                unique_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                creator TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL DEFAULT '',
                dimensions TEXT NOT NULL DEFAULT '',
                object_type TEXT NOT NULL DEFAULT '',
                accession TEXT NOT NULL DEFAULT '',
                original_citation TEXT NOT NULL DEFAULT '',
                image_url TEXT NOT NULL DEFAULT '',
                detail_url TEXT NOT NULL DEFAULT '',
                categories TEXT NOT NULL DEFAULT '',
                local_path TEXT NOT NULL DEFAULT '',
                target_filename TEXT NOT NULL DEFAULT '',
                remote_file_ref TEXT,
                remote_entity_id TEXT,
                metadata_complete INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'not_started',
                failure_reason TEXT,
                updated_at TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
            "#,
        )
        .map_err(|e| GlamliftError::Database {
            message: format!("Failed to create ledger schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Add tracking columns missing from a ledger created by an older
    /// version. Catalog columns are covered by the CREATE TABLE.
    fn ensure_columns(conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(records)")?;
        let existing: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

        let tracking: &[(&str, &str)] = &[
            ("remote_file_ref", "TEXT"),
            ("remote_entity_id", "TEXT"),
            ("metadata_complete", "INTEGER NOT NULL DEFAULT 0"),
            ("status", "TEXT NOT NULL DEFAULT 'not_started'"),
            ("failure_reason", "TEXT"),
            ("updated_at", "TEXT NOT NULL DEFAULT ''"),
        ];

        for (name, column_type) in tracking {
            if !existing.contains(*name) {
                info!("Adding missing ledger column: {}", name);
                conn.execute(
                    &format!("ALTER TABLE records ADD COLUMN {} {}", name, column_type),
                    [],
                )?;
            }
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| GlamliftError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Upsert catalog records.
    ///
    /// Descriptive fields are refreshed; tracking fields (status, remote
    /// ids, failure reason) are left alone so re-importing an updated
    /// catalog never loses migration progress.
    pub fn import_records(&self, records: &[CatalogRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        for record in records {
            tx.execute(
                r#"
                INSERT INTO records (
                    unique_id, title, creator, description, date, dimensions,
                    object_type, accession, original_citation, image_url,
                    detail_url, categories, local_path, target_filename,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(unique_id) DO UPDATE SET
                    title = excluded.title,
                    creator = excluded.creator,
                    description = excluded.description,
                    date = excluded.date,
                    dimensions = excluded.dimensions,
                    object_type = excluded.object_type,
                    accession = excluded.accession,
                    original_citation = excluded.original_citation,
                    image_url = excluded.image_url,
                    detail_url = excluded.detail_url,
                    categories = excluded.categories,
                    local_path = excluded.local_path,
                    target_filename = excluded.target_filename,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.unique_id,
                    record.title,
                    record.creator,
                    record.description,
                    record.date,
                    record.dimensions,
                    record.object_type,
                    record.accession,
                    record.original_citation,
                    record.image_url,
                    record.detail_url,
                    record.categories,
                    record.local_path,
                    record.target_filename,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        info!("Imported {} records into ledger", records.len());
        Ok(records.len())
    }

    /// Fetch one record by id.
    pub fn get(&self, unique_id: &str) -> Result<Option<LedgerEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE unique_id = ?1", SELECT_COLUMNS),
                params![unique_id],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Fetch records by catalog position, `[start, end)` in import order.
    pub fn get_range(&self, start: usize, end: usize) -> Result<Vec<LedgerEntry>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records ORDER BY rowid LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![(end - start) as i64, start as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// All record ids in import order.
    pub fn all_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT unique_id FROM records ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Ids of records whose upload succeeded, in import order.
    pub fn migrated_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT unique_id FROM records \
             WHERE status IN ('uploaded', 'metadata_partial', 'metadata_complete') \
             ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Ids of uploaded records whose metadata is not yet complete.
    pub fn pending_metadata_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT unique_id FROM records \
             WHERE status IN ('uploaded', 'metadata_partial') \
             ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Number of records in the ledger.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Persist the remote ids right after a successful upload.
    ///
    /// Called before any metadata work so an interruption between upload
    /// and reconcile cannot orphan the remote file.
    pub fn record_upload(
        &self,
        unique_id: &str,
        file_ref: &str,
        entity_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let current = Self::current_status(&conn, unique_id)?;
        let status = MigrationState::advance(current, MigrationState::Uploaded);
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE records SET \
                remote_file_ref = ?2, \
                remote_entity_id = COALESCE(?3, remote_entity_id), \
                status = ?4, \
                failure_reason = NULL, \
                updated_at = ?5 \
             WHERE unique_id = ?1",
            params![unique_id, file_ref, entity_id, status, now],
        )?;
        debug!("Recorded upload for {} ({})", unique_id, file_ref);
        Ok(())
    }

    /// Record the outcome of a metadata reconcile pass.
    pub fn record_metadata(&self, unique_id: &str, complete: bool) -> Result<()> {
        let conn = self.conn()?;
        let current = Self::current_status(&conn, unique_id)?;
        let target = if complete {
            MigrationState::MetadataComplete
        } else {
            MigrationState::MetadataPartial
        };
        let status = MigrationState::advance(current, target);
        let flag = status == MigrationState::MetadataComplete;
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE records SET \
                metadata_complete = ?2, \
                status = ?3, \
                failure_reason = CASE WHEN ?2 THEN NULL ELSE failure_reason END, \
                updated_at = ?4 \
             WHERE unique_id = ?1",
            params![unique_id, flag, status, now],
        )?;
        Ok(())
    }

    /// Record why a record's latest attempt failed.
    ///
    /// The reason is always written. The status only becomes `failed` when
    /// nothing is on the remote yet; once uploaded, the record keeps its
    /// forward progress and the reason explains what is still missing.
    pub fn record_failure(&self, unique_id: &str, reason: &str) -> Result<()> {
        let conn = self.conn()?;
        let current = Self::current_status(&conn, unique_id)?;
        let status = MigrationState::advance(current, MigrationState::Failed);
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE records SET status = ?2, failure_reason = ?3, updated_at = ?4 \
             WHERE unique_id = ?1",
            params![unique_id, status, reason, now],
        )?;
        debug!("Recorded failure for {}: {}", unique_id, reason);
        Ok(())
    }

    /// Requeue all failed records. Returns how many were reset.
    pub fn reset_failed(&self) -> Result<usize> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE records SET status = 'not_started', failure_reason = NULL, updated_at = ?1 \
             WHERE status = 'failed'",
            params![now],
        )?;
        info!("Reset {} failed records", changed);
        Ok(changed)
    }

    /// Overwrite the completeness flag from an audit of the live remote.
    ///
    /// This is the one write allowed to move between partial and complete
    /// in both directions. Records that were never uploaded are left alone.
    pub fn set_verified(&self, unique_id: &str, complete: bool) -> Result<()> {
        let conn = self.conn()?;
        let current = Self::current_status(&conn, unique_id)?;
        if current.rank() < MigrationState::Uploaded.rank() {
            debug!("Skipping verify result for {}: not uploaded", unique_id);
            return Ok(());
        }

        let status = if complete {
            MigrationState::MetadataComplete
        } else {
            MigrationState::MetadataPartial
        };
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE records SET metadata_complete = ?2, status = ?3, updated_at = ?4 \
             WHERE unique_id = ?1",
            params![unique_id, complete, status, now],
        )?;
        Ok(())
    }

    /// Count records per migration state.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM records GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, MigrationState>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = StatusCounts::default();
        for (state, count) in rows {
            let count = count as usize;
            match state {
                MigrationState::NotStarted => counts.not_started = count,
                MigrationState::Failed => counts.failed = count,
                MigrationState::Uploaded => counts.uploaded = count,
                MigrationState::MetadataPartial => counts.metadata_partial = count,
                MigrationState::MetadataComplete => counts.metadata_complete = count,
            }
        }
        Ok(counts)
    }

    /// Flush the WAL into the main database file.
    ///
    /// Called periodically during long runs so the main file on disk stays
    /// close to the truth even if the process dies.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| GlamliftError::Database {
                message: format!("Failed to checkpoint ledger: {}", e),
                source: Some(e),
            })?;
        Ok(())
    }

    fn current_status(conn: &Connection, unique_id: &str) -> Result<MigrationState> {
        conn.query_row(
            "SELECT status FROM records WHERE unique_id = ?1",
            params![unique_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| GlamliftError::RecordNotFound(unique_id.to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            record: CatalogRecord {
                unique_id: row.get(0)?,
                title: row.get(1)?,
                creator: row.get(2)?,
                description: row.get(3)?,
                date: row.get(4)?,
                dimensions: row.get(5)?,
                object_type: row.get(6)?,
                accession: row.get(7)?,
                original_citation: row.get(8)?,
                image_url: row.get(9)?,
                detail_url: row.get(10)?,
                categories: row.get(11)?,
                local_path: row.get(12)?,
                target_filename: row.get(13)?,
            },
            remote_file_ref: row.get(14)?,
            remote_entity_id: row.get(15)?,
            metadata_complete: row.get(16)?,
            status: row.get(17)?,
            failure_reason: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }
}
