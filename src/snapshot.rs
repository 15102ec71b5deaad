//! LMDB snapshot of index entries so the index can be rebuilt at startup.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::EnvOpenOptions;

use crate::error::{Error, Result};
use crate::vector_entry::IndexEntry;

const MAP_SIZE: usize = 1024 * 1024 * 1024; // 1GB

pub struct Snapshot {
    env: heed::Env,
    db: heed::Database<Str, Bytes>,
    path: PathBuf,
}

/// Zero-padded so LMDB's lexicographic key order equals position order.
fn key_for(position: usize) -> String {
    format!("{position:012}")
}

impl Snapshot {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = PathBuf::from(path.as_ref());

        fs::create_dir_all(&path).map_err(|e| {
            Error::Storage(format!(
                "failed to create snapshot directory '{}': {e}",
                path.display()
            ))
        })?;

        tracing::info!(path = %path.display(), "opening index snapshot");

        let env = unsafe { EnvOpenOptions::new().map_size(MAP_SIZE).max_dbs(1).open(&path)? };

        let mut wtxn = env.write_txn()?;
        let db: heed::Database<Str, Bytes> = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;

        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a batch of entries in a single transaction.
    pub fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        for entry in entries {
            let value = bincode::serialize(entry)?;
            self.db.put(&mut wtxn, &key_for(entry.position), &value)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    /// Every stored entry, in position order.
    pub fn load(&self) -> Result<Vec<IndexEntry>> {
        let rtxn = self.env.read_txn()?;
        let mut entries = Vec::new();
        for item in self.db.iter(&rtxn)? {
            let (_, value) = item?;
            entries.push(bincode::deserialize::<IndexEntry>(value)?);
        }
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
