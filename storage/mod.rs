/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Opaque blob storage behind the snapshot repository.
//!
//! The store holds whole collections under string keys with
//! get-all/set-all semantics — no partial-record updates. Quota is
//! enforced at write time so a failed save leaves the previous
//! collection intact.
//!
//! Backends:
//! - `MemoryBlobStore`: plain map, default for tests and embedding
//! - `RedbBlobStore`: one redb table with zstd-compressed payloads

use std::collections::HashMap;
use std::path::Path;

use redb::{ReadableDatabase, ReadableTable};

use crate::error::Error;

const BLOB_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("blobs");

/// Default quota mirroring a browser-local storage area.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

const ZSTD_LEVEL: i32 = 3;

/// Errors from the blob layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    QuotaExceeded { used: u64, quota: u64 },
    Io(String),
    Redb(String),
    Compression(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::QuotaExceeded { used, quota } => {
                write!(f, "Quota exceeded: {used} of {quota} bytes")
            },
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Redb(e) => write!(f, "Redb error: {e}"),
            StoreError::Compression(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded { used, quota } => Error::QuotaExceeded { used, quota },
            other => Error::Store(other.to_string()),
        }
    }
}

/// Keyed whole-blob storage with a fixed quota.
pub trait BlobStore {
    /// Read the full blob under `key`; `Ok(None)` when absent.
    fn get_all(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the full blob under `key`. Fails with
    /// [`StoreError::QuotaExceeded`] when the write would not fit;
    /// the previous blob is retained in that case.
    fn set_all(&mut self, key: &str, blob: &[u8]) -> Result<(), StoreError>;

    /// Drop the blob under `key`; absent keys are fine.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Bytes currently occupied across all keys.
    fn bytes_in_use(&self) -> Result<u64, StoreError>;

    fn quota_bytes(&self) -> u64;
}

/// In-memory [`BlobStore`].
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
    quota: u64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            blobs: HashMap::new(),
            quota,
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get_all(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set_all(&mut self, key: &str, blob: &[u8]) -> Result<(), StoreError> {
        let existing = self.blobs.get(key).map(|b| b.len() as u64).unwrap_or(0);
        let others: u64 = self.bytes_in_use()? - existing;
        let prospective = others + blob.len() as u64;
        if prospective > self.quota {
            return Err(StoreError::QuotaExceeded {
                used: prospective,
                quota: self.quota,
            });
        }
        self.blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.blobs.remove(key);
        Ok(())
    }

    fn bytes_in_use(&self) -> Result<u64, StoreError> {
        Ok(self.blobs.values().map(|b| b.len() as u64).sum())
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}

/// Persistent [`BlobStore`] over a single redb table. Payloads are
/// zstd-compressed; quota accounting runs over the compressed sizes.
pub struct RedbBlobStore {
    db: redb::Database,
    quota: u64,
}

impl RedbBlobStore {
    /// Open or create a store file at `path`.
    pub fn open(path: &Path, quota: u64) -> Result<Self, StoreError> {
        let db = redb::Database::create(path).map_err(|e| StoreError::Redb(format!("{e}")))?;
        Ok(Self { db, quota })
    }

    fn stored_len(&self, key: &str) -> Result<u64, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let Ok(table) = read_txn.open_table(BLOB_TABLE) else {
            return Ok(0);
        };
        let entry = table
            .get(key)
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        Ok(entry.map(|v| v.value().len() as u64).unwrap_or(0))
    }
}

impl BlobStore for RedbBlobStore {
    fn get_all(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let Ok(table) = read_txn.open_table(BLOB_TABLE) else {
            return Ok(None);
        };
        let Some(entry) = table
            .get(key)
            .map_err(|e| StoreError::Redb(format!("{e}")))?
        else {
            return Ok(None);
        };
        let decompressed = zstd::stream::decode_all(std::io::Cursor::new(entry.value()))
            .map_err(|e| StoreError::Compression(format!("zstd decode failed: {e}")))?;
        Ok(Some(decompressed))
    }

    fn set_all(&mut self, key: &str, blob: &[u8]) -> Result<(), StoreError> {
        let compressed = zstd::stream::encode_all(std::io::Cursor::new(blob), ZSTD_LEVEL)
            .map_err(|e| StoreError::Compression(format!("zstd encode failed: {e}")))?;

        let others = self.bytes_in_use()? - self.stored_len(key)?;
        let prospective = others + compressed.len() as u64;
        if prospective > self.quota {
            return Err(StoreError::QuotaExceeded {
                used: prospective,
                quota: self.quota,
            });
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(BLOB_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            table
                .insert(key, compressed.as_slice())
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(BLOB_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            let _ = table
                .remove(key)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn bytes_in_use(&self) -> Result<u64, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let Ok(table) = read_txn.open_table(BLOB_TABLE) else {
            return Ok(0);
        };
        let iter = table
            .iter()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let mut total = 0u64;
        for entry in iter {
            let (_, value) = entry.map_err(|e| StoreError::Redb(format!("{e}")))?;
            total += value.value().len() as u64;
        }
        Ok(total)
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}
