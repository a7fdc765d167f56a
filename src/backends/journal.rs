use super::{JournalRecord, JournalStore};
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Journal entries kept in a sled tree, keyed by creation time.
///
/// Keys are big-endian nanosecond timestamps so iteration is chronological.
/// A collision on the same nanosecond bumps the key by one.
#[derive(Clone)]
pub struct SledJournal {
    tree: sled::Tree,
}

impl SledJournal {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self::new(db.open_tree("journal")?))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Result<Vec<(String, JournalRecord)>> {
        let mut out = Vec::with_capacity(limit);
        for item in self.tree.iter().rev().take(limit) {
            let (key, value) = item?;
            let record: JournalRecord = serde_json::from_slice(&value)
                .map_err(|e| Error::Store(format!("corrupt journal record: {}", e)))?;
            out.push((key_to_id(&key), record));
        }
        Ok(out)
    }

    fn insert_unique(&self, mut ts: i64, value: &[u8]) -> Result<i64> {
        loop {
            let key = ts.to_be_bytes();
            match self
                .tree
                .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            {
                Ok(()) => return Ok(ts),
                Err(_) => ts += 1,
            }
        }
    }
}

fn key_to_id(key: &[u8]) -> String {
    let mut buf = [0u8; 8];
    if key.len() == 8 {
        buf.copy_from_slice(key);
    }
    i64::from_be_bytes(buf).to_string()
}

#[async_trait]
impl JournalStore for SledJournal {
    async fn save(&self, record: &JournalRecord) -> Result<String> {
        let value = serde_json::to_vec(record)
            .map_err(|e| Error::Persistence(format!("could not encode entry: {}", e)))?;
        let ts = record.created_at.timestamp_nanos_opt().unwrap_or(0);

        let id = self
            .insert_unique(ts, &value)
            .map_err(|e| Error::Persistence(e.to_string()))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::debug!(entry_id = id, owner = %record.owner_id, "Journal entry saved");
        Ok(id.to_string())
    }
}
