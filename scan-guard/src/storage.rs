//! redb-based local storage for scan sessions and key material
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `sessions` | `strict_scan.session.<picking_id>` | session blob | One session per picking |
//! | `key_material` | `strict_scan.crypto_key` | base64 key | Global session key slot |
//!
//! # Durability
//!
//! Every write is its own transaction committed with redb's default
//! immediate durability, so a blob is on disk once the write returns.
//! Writes are not transactional across calls.

use redb::{Database, ReadableDatabase, ReadableTable, StorageBackend, TableDefinition};
use shared::picking::PickingId;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

type BlobTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Session blobs: key = namespaced picking key, value = JSON (plain or envelope)
const SESSIONS_TABLE: BlobTable = TableDefinition::new("sessions");

/// Key material: key = global slot name, value = exported key
const KEY_MATERIAL_TABLE: BlobTable = TableDefinition::new("key_material");

const SESSION_KEY_PREFIX: &str = "strict_scan.session.";
const CRYPTO_KEY_SLOT: &str = "strict_scan.crypto_key";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Namespaced storage key of a picking session
pub fn session_storage_key(picking_id: PickingId) -> String {
    format!("{SESSION_KEY_PREFIX}{picking_id}")
}

/// Local storage backed by redb
#[derive(Clone)]
pub struct LocalStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage").finish_non_exhaustive()
    }
}

impl LocalStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, ephemeral devices)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    /// Open over a custom redb storage backend
    pub fn open_with_backend(backend: impl StorageBackend) -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
            let _ = write_txn.open_table(KEY_MATERIAL_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read(&self, table: BlobTable, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn write(&self, table: BlobTable, key: &str, value: &[u8]) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, table: BlobTable, key: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(table)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    // ========== Session slot ==========

    pub fn load_session_blob(&self, picking_id: PickingId) -> StorageResult<Option<Vec<u8>>> {
        self.read(SESSIONS_TABLE, &session_storage_key(picking_id))
    }

    pub fn store_session_blob(&self, picking_id: PickingId, blob: &[u8]) -> StorageResult<()> {
        self.write(SESSIONS_TABLE, &session_storage_key(picking_id), blob)
    }

    /// Returns whether a blob existed
    pub fn delete_session_blob(&self, picking_id: PickingId) -> StorageResult<bool> {
        self.remove(SESSIONS_TABLE, &session_storage_key(picking_id))
    }

    // ========== Key slot ==========

    pub fn load_key_material(&self) -> StorageResult<Option<Vec<u8>>> {
        self.read(KEY_MATERIAL_TABLE, CRYPTO_KEY_SLOT)
    }

    pub fn store_key_material(&self, material: &[u8]) -> StorageResult<()> {
        self.write(KEY_MATERIAL_TABLE, CRYPTO_KEY_SLOT, material)
    }
}
