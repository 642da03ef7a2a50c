// Copyright 2024 Vault Bridge Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp;
use std::path::Path;

use ethers::types::H256;

use super::{
    CursorStore, ProcessedKey, ProcessedMark, ProcessedStore, StreamId,
};

/// Tree holding the per-stream recovery cursors.
const CURSORS_TREE: &str = "block_cursors";
/// Tree holding the processed-events deduplication rows.
const PROCESSED_TREE: &str = "processed_events";

/// SledStore is the durable store of the relayer, backed by a
/// [Sled](https://sled.rs) database.
///
/// Sled journals every write through its log before acknowledging it, and
/// [`ProcessedStore::mark_processed`] additionally flushes so that an
/// acknowledged mark survives a crash or container restart.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> crate::Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_block_number(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    if bytes.len() == 8 {
        buf.copy_from_slice(bytes);
    }
    u64::from_le_bytes(buf)
}

impl CursorStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_cursor(
        &self,
        stream: StreamId,
        block_number: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree(CURSORS_TREE)?;
        // never allow the cursor to move backwards, even under a buggy or
        // concurrent caller.
        let stored = tree.update_and_fetch(stream.as_str(), |old| {
            let previous = old.map(decode_block_number).unwrap_or(0);
            Some(cmp::max(previous, block_number).to_le_bytes().to_vec())
        })?;
        Ok(stored.as_deref().map(decode_block_number).unwrap_or(0))
    }

    #[tracing::instrument(skip(self))]
    fn get_cursor(&self, stream: StreamId) -> crate::Result<u64> {
        let tree = self.db.open_tree(CURSORS_TREE)?;
        let val = tree.get(stream.as_str())?;
        Ok(val.as_deref().map(decode_block_number).unwrap_or(0))
    }
}

impl ProcessedStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn mark_processed(
        &self,
        key: &ProcessedKey,
        dest_tx_hash: Option<H256>,
    ) -> crate::Result<()> {
        let tree = self.db.open_tree(PROCESSED_TREE)?;
        let mark = ProcessedMark::new(dest_tx_hash);
        let value = serde_json::to_vec(&mark)?;
        // insert-if-absent: a primary-key collision means another attempt
        // already recorded this event, which counts as success.
        let outcome = tree.compare_and_swap(
            key.to_bytes(),
            Option::<&[u8]>::None,
            Some(value),
        )?;
        if outcome.is_err() {
            tracing::trace!(%key, "event was already marked as processed");
        }
        tree.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn is_processed(&self, key: &ProcessedKey) -> crate::Result<bool> {
        let tree = self.db.open_tree(PROCESSED_TREE)?;
        let exists = tree.contains_key(key.to_bytes())?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self))]
    fn get_processed(
        &self,
        key: &ProcessedKey,
    ) -> crate::Result<Option<ProcessedMark>> {
        let tree = self.db.open_tree(PROCESSED_TREE)?;
        let val = tree.get(key.to_bytes())?;
        match val {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventKind;
    use ethers::types::U256;

    fn key(nonce: u64) -> ProcessedKey {
        ProcessedKey::new(
            StreamId::ChainALock,
            U256::from(nonce),
            EventKind::Locked,
        )
    }

    #[test]
    fn cursor_defaults_to_zero() {
        let store = SledStore::temporary().unwrap();
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 0);
    }

    #[test]
    fn cursor_round_trips() {
        let store = SledStore::temporary().unwrap();
        store.set_cursor(StreamId::ChainBBurn, 55).unwrap();
        assert_eq!(store.get_cursor(StreamId::ChainBBurn).unwrap(), 55);
        // other streams are unaffected
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 0);
    }

    #[test]
    fn cursor_never_decreases() {
        let store = SledStore::temporary().unwrap();
        store.set_cursor(StreamId::ChainALock, 100).unwrap();
        let stored = store.set_cursor(StreamId::ChainALock, 40).unwrap();
        assert_eq!(stored, 100);
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 100);
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let store = SledStore::temporary().unwrap();
        let k = key(0);
        assert!(!store.is_processed(&k).unwrap());

        let first_hash = H256::repeat_byte(0xaa);
        store.mark_processed(&k, Some(first_hash)).unwrap();
        assert!(store.is_processed(&k).unwrap());

        // a second mark with a different hash must not overwrite the first.
        store
            .mark_processed(&k, Some(H256::repeat_byte(0xbb)))
            .unwrap();
        let mark = store.get_processed(&k).unwrap().unwrap();
        assert_eq!(mark.dest_tx_hash, Some(first_hash));
    }

    #[test]
    fn marks_are_keyed_by_stream_nonce_and_kind() {
        let store = SledStore::temporary().unwrap();
        store.mark_processed(&key(7), None).unwrap();

        let other_stream = ProcessedKey::new(
            StreamId::ChainBBurn,
            U256::from(7u64),
            EventKind::Burned,
        );
        assert!(store.is_processed(&key(7)).unwrap());
        assert!(!store.is_processed(&other_stream).unwrap());
        assert!(!store.is_processed(&key(8)).unwrap());
    }

    #[test]
    fn empty_dest_tx_marker_round_trips() {
        let store = SledStore::temporary().unwrap();
        let k = key(3);
        store.mark_processed(&k, None).unwrap();
        let mark = store.get_processed(&k).unwrap().unwrap();
        assert_eq!(mark.dest_tx_hash, None);
        assert!(mark.created_at > 0);
    }
}
