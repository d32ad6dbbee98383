use crate::error::{Error, Result};
use crate::object::ObjectId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SCHEMA_VERSION: i32 = 1;

/// One indexed item: a stable uid and the blob it points at. Uids are
/// assigned once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub uid: u32,
    pub blob: ObjectId,
}

/// Persisted synchronization state: the head commit the index was last
/// reconciled against and the next uid to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub head: Option<ObjectId>,
    pub next_uid: u32,
}

/// One reconciliation outcome, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBatch {
    pub removals: Vec<u32>,
    pub appends: Vec<Record>,
    pub next_uid: u32,
    pub head: ObjectId,
}

/// Persisted index interface. The store belongs to the host; this crate
/// only reads records and applies reconciliation batches. `apply` must be
/// atomic: either the whole batch lands, including the sync state, or
/// nothing does.
pub trait IndexStore {
    /// All records, uid ascending.
    fn records(&self) -> Result<Vec<Record>>;

    fn sync_state(&self) -> Result<SyncState>;

    fn apply(&mut self, batch: &IndexBatch) -> Result<()>;
}

/// SQLite-backed reference implementation.
pub struct SqliteIndex {
    conn: Connection,
}

impl SqliteIndex {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut index = Self { conn };
        index.initialize()?;
        Ok(index)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut index = Self { conn };
        index.initialize()?;
        Ok(index)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS records (
                uid INTEGER PRIMARY KEY,
                blob_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                head TEXT,
                next_uid INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_blob ON records(blob_id);
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;

        if version.is_none() {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO sync_state (id, head, next_uid) VALUES (1, NULL, 1)",
            [],
        )?;

        Ok(())
    }
}

impl IndexStore for SqliteIndex {
    fn records(&self) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uid, blob_id FROM records ORDER BY uid")?;

        let rows = stmt
            .query_map([], |row| {
                let uid: u32 = row.get(0)?;
                let blob_id: String = row.get(1)?;
                Ok((uid, blob_id))
            })?
            .collect::<rusqlite::Result<Vec<(u32, String)>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (uid, blob_id) in rows {
            records.push(Record {
                uid,
                blob: ObjectId::from_hex(&blob_id)?,
            });
        }
        Ok(records)
    }

    fn sync_state(&self) -> Result<SyncState> {
        let (head, next_uid): (Option<String>, u32) = self.conn.query_row(
            "SELECT head, next_uid FROM sync_state WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let head = match head {
            Some(hex) => Some(ObjectId::from_hex(&hex)?),
            None => None,
        };
        Ok(SyncState { head, next_uid })
    }

    fn apply(&mut self, batch: &IndexBatch) -> Result<()> {
        let write = |conn: &mut Connection| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            for uid in &batch.removals {
                tx.execute("DELETE FROM records WHERE uid = ?1", params![uid])?;
            }
            for record in &batch.appends {
                tx.execute(
                    "INSERT INTO records (uid, blob_id) VALUES (?1, ?2)",
                    params![record.uid, record.blob.to_hex()],
                )?;
            }
            tx.execute(
                "UPDATE sync_state SET head = ?1, next_uid = ?2 WHERE id = 1",
                params![batch.head.to_hex(), batch.next_uid],
            )?;
            tx.commit()
        };

        write(&mut self.conn).map_err(|e| Error::IndexWrite(e.to_string()))
    }
}
