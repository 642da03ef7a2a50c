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
use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::H256;
use parking_lot::RwLock;

use super::{
    CursorStore, ProcessedKey, ProcessedMark, ProcessedStore, StreamId,
};

/// InMemoryStore keeps the relayer bookkeeping in process memory.
///
/// It implements the same traits as [`super::SledStore`] and is used by the
/// unit tests; nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cursors: Arc<RwLock<HashMap<StreamId, u64>>>,
    processed: Arc<RwLock<HashMap<Vec<u8>, ProcessedMark>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl CursorStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn set_cursor(
        &self,
        stream: StreamId,
        block_number: u64,
    ) -> crate::Result<u64> {
        let mut guard = self.cursors.write();
        let entry = guard.entry(stream).or_insert(0);
        *entry = cmp::max(*entry, block_number);
        Ok(*entry)
    }

    #[tracing::instrument(skip(self))]
    fn get_cursor(&self, stream: StreamId) -> crate::Result<u64> {
        let guard = self.cursors.read();
        Ok(guard.get(&stream).copied().unwrap_or(0))
    }
}

impl ProcessedStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn mark_processed(
        &self,
        key: &ProcessedKey,
        dest_tx_hash: Option<H256>,
    ) -> crate::Result<()> {
        let mut guard = self.processed.write();
        guard
            .entry(key.to_bytes())
            .or_insert_with(|| ProcessedMark::new(dest_tx_hash));
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn is_processed(&self, key: &ProcessedKey) -> crate::Result<bool> {
        let guard = self.processed.read();
        Ok(guard.contains_key(&key.to_bytes()))
    }

    #[tracing::instrument(skip(self))]
    fn get_processed(
        &self,
        key: &ProcessedKey,
    ) -> crate::Result<Option<ProcessedMark>> {
        let guard = self.processed.read();
        Ok(guard.get(&key.to_bytes()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventKind;
    use ethers::types::U256;

    #[test]
    fn behaves_like_the_durable_store() {
        let store = InMemoryStore::default();
        assert_eq!(store.get_cursor(StreamId::ChainBGovernance).unwrap(), 0);
        store.set_cursor(StreamId::ChainBGovernance, 10).unwrap();
        store.set_cursor(StreamId::ChainBGovernance, 4).unwrap();
        assert_eq!(store.get_cursor(StreamId::ChainBGovernance).unwrap(), 10);

        let key = ProcessedKey::new(
            StreamId::ChainBGovernance,
            U256::zero(),
            EventKind::ProposalPassed,
        );
        assert!(!store.is_processed(&key).unwrap());
        store
            .mark_processed(&key, Some(H256::repeat_byte(0x11)))
            .unwrap();
        store.mark_processed(&key, None).unwrap();
        let mark = store.get_processed(&key).unwrap().unwrap();
        assert_eq!(mark.dest_tx_hash, Some(H256::repeat_byte(0x11)));
    }
}
