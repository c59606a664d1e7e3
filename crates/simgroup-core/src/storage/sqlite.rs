//! SQLite storage backend.
//!
//! Schema:
//! - groups: id, name, division, grouped_data (JSON text), created_at (RFC 3339),
//!   signature parameters (seed kept as its i64 bit pattern)
//! - upload_files: group_id -> file name and size
//! - vectors: group_id -> bincode blob of u64 signature components, payload text,
//!   origin file name

use super::SignatureStore;
use crate::error::{CoreError, Result};
use crate::types::{
    FileInfo, GroupId, GroupRecord, NewGroup, NewVector, SignatureParams, VectorId, VectorRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    division TEXT NOT NULL,
    grouped_data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    num_permutations INTEGER NOT NULL,
    seed INTEGER NOT NULL,
    ngram_size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS upload_files (
    id INTEGER PRIMARY KEY,
    group_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS vectors (
    id INTEGER PRIMARY KEY,
    group_id INTEGER NOT NULL,
    signature BLOB NOT NULL,
    dim INTEGER NOT NULL,
    payload TEXT NOT NULL,
    origin TEXT NOT NULL,
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_groups_division ON groups(division);
CREATE INDEX IF NOT EXISTS idx_upload_files_group_id ON upload_files(group_id);
CREATE INDEX IF NOT EXISTS idx_vectors_group_id ON vectors(group_id);
";

/// SQLite-backed signature store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = %path.display(), "Opened signature store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Storage("connection lock poisoned".into()))
    }
}

impl SignatureStore for SqliteStore {
    fn commit_group(&self, group: NewGroup, vectors: Vec<NewVector>) -> Result<GroupRecord> {
        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls everything back.
        let tx = conn.transaction()?;

        let created_at = Utc::now();
        let grouped_data = serde_json::to_string(&group.grouped_data)?;
        tx.execute(
            "INSERT INTO groups (name, division, grouped_data, created_at, num_permutations, seed, ngram_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group.name,
                group.division,
                grouped_data,
                created_at.to_rfc3339(),
                group.params.num_permutations as i64,
                group.params.seed as i64,
                group.params.ngram_size as i64,
            ],
        )?;
        let group_id = tx.last_insert_rowid();

        for file in &group.files {
            tx.execute(
                "INSERT INTO upload_files (group_id, file_name, file_size) VALUES (?1, ?2, ?3)",
                params![group_id, file.name, file.size as i64],
            )?;
        }

        insert_vectors(&tx, group_id, None, &vectors)?;
        tx.commit()?;

        debug!(
            group_id,
            files = group.files.len(),
            vectors = vectors.len(),
            "Committed group"
        );

        Ok(GroupRecord {
            id: group_id,
            name: group.name,
            division: group.division,
            created_at,
            grouped_data: group.grouped_data,
            files: group.files,
            params: group.params,
        })
    }

    fn update_group(
        &self,
        group_id: GroupId,
        name: &str,
        grouped_data: &serde_json::Value,
    ) -> Result<GroupRecord> {
        let conn = self.lock()?;
        let data = serde_json::to_string(grouped_data)?;
        let updated = conn.execute(
            "UPDATE groups SET name = ?2, grouped_data = ?3 WHERE id = ?1",
            params![group_id, name, data],
        )?;
        if updated == 0 {
            return Err(CoreError::GroupNotFound(group_id));
        }
        read_group(&conn, group_id)?.ok_or(CoreError::GroupNotFound(group_id))
    }

    fn put(&self, group_id: GroupId, vector: &NewVector) -> Result<VectorId> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !group_exists(&tx, group_id)? {
            return Err(CoreError::GroupNotFound(group_id));
        }
        let dim = group_dimension(&tx, group_id)?;
        insert_vectors(&tx, group_id, dim, std::slice::from_ref(vector))?;
        let vector_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(vector_id)
    }

    fn list_by_group(&self, group_id: GroupId) -> Result<Vec<VectorRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_id, signature, payload, origin FROM vectors WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, group_id, blob, payload, origin) = row?;
            let signature: Vec<u64> = bincode::deserialize(&blob)?;
            records.push(VectorRecord {
                id,
                group_id,
                signature,
                payload,
                origin,
            });
        }
        Ok(records)
    }

    fn get_group(&self, group_id: GroupId) -> Result<Option<GroupRecord>> {
        let conn = self.lock()?;
        read_group(&conn, group_id)
    }

    fn list_groups(&self, division: Option<&str>) -> Result<Vec<GroupRecord>> {
        let conn = self.lock()?;
        let rows: Vec<GroupRow> = {
            let mut stmt = conn.prepare(
                "SELECT id, name, division, created_at, grouped_data, num_permutations, seed, ngram_size
                 FROM groups WHERE (?1 IS NULL OR division = ?1) ORDER BY id",
            )?;
            let rows = stmt.query_map(params![division], GroupRow::from_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(|row| row.into_record(&conn)).collect()
    }

    fn delete_group(&self, group_id: GroupId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM groups WHERE id = ?1", params![group_id])?;
        if deleted > 0 {
            debug!(group_id, "Deleted group");
        }
        Ok(deleted > 0)
    }
}

/// Raw group row, converted outside the rusqlite row closure.
struct GroupRow {
    id: GroupId,
    name: String,
    division: String,
    created_at: String,
    grouped_data: String,
    num_permutations: i64,
    seed: i64,
    ngram_size: i64,
}

impl GroupRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            division: row.get(2)?,
            created_at: row.get(3)?,
            grouped_data: row.get(4)?,
            num_permutations: row.get(5)?,
            seed: row.get(6)?,
            ngram_size: row.get(7)?,
        })
    }

    fn into_record(self, conn: &Connection) -> Result<GroupRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| CoreError::InvalidFormat(format!("created_at: {e}")))?
            .with_timezone(&Utc);
        let grouped_data = serde_json::from_str(&self.grouped_data)?;
        let files = load_files(conn, self.id)?;

        Ok(GroupRecord {
            id: self.id,
            name: self.name,
            division: self.division,
            created_at,
            grouped_data,
            files,
            params: SignatureParams {
                num_permutations: self.num_permutations as usize,
                seed: self.seed as u64,
                ngram_size: self.ngram_size as usize,
            },
        })
    }
}

fn read_group(conn: &Connection, group_id: GroupId) -> Result<Option<GroupRecord>> {
    let row = conn
        .query_row(
            "SELECT id, name, division, created_at, grouped_data, num_permutations, seed, ngram_size
             FROM groups WHERE id = ?1",
            params![group_id],
            GroupRow::from_row,
        )
        .optional()?;
    row.map(|r| r.into_record(conn)).transpose()
}

fn load_files(conn: &Connection, group_id: GroupId) -> Result<Vec<FileInfo>> {
    let mut stmt = conn
        .prepare("SELECT file_name, file_size FROM upload_files WHERE group_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![group_id], |row| {
        Ok(FileInfo {
            name: row.get(0)?,
            size: row.get::<_, i64>(1)? as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn group_exists(conn: &Connection, group_id: GroupId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM groups WHERE id = ?1",
            params![group_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn group_dimension(conn: &Connection, group_id: GroupId) -> Result<Option<usize>> {
    let dim = conn
        .query_row(
            "SELECT dim FROM vectors WHERE group_id = ?1 LIMIT 1",
            params![group_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(dim.map(|d| d as usize))
}

/// Insert vectors one by one, enforcing a single signature length per group.
///
/// Must run inside a transaction: a length mismatch part way through leaves
/// earlier rows behind until the caller rolls back.
fn insert_vectors(
    conn: &Connection,
    group_id: GroupId,
    mut dim: Option<usize>,
    vectors: &[NewVector],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO vectors (group_id, signature, dim, payload, origin) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for vector in vectors {
        let len = vector.signature.len();
        match dim {
            None if len == 0 => {
                return Err(CoreError::InvalidFormat("empty signature".into()));
            }
            None => dim = Some(len),
            Some(expected) if expected != len => {
                return Err(CoreError::InvalidFormat(format!(
                    "signature length {len} does not match group dimension {expected}"
                )));
            }
            Some(_) => {}
        }

        let blob = bincode::serialize(&vector.signature)?;
        stmt.execute(params![group_id, blob, len as i64, vector.payload, vector.origin])?;
    }

    Ok(())
}
