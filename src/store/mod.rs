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

//! # Relayer Store Module
//!
//! Durable bookkeeping for the relayer: which events have already been acted
//! upon (deduplication) and how far each stream has scanned its source chain
//! (recovery cursors).

use std::fmt::{self, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
pub mod sled;

pub use self::sled::SledStore;
pub use mem::InMemoryStore;

/// One relayed event stream: a (source chain, event type) pair with an
/// associated destination call and cursor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum StreamId {
    /// `Locked` events on the settlement chain's token vault.
    ChainALock,
    /// `Burned` events on the execution chain's wrapped token.
    ChainBBurn,
    /// `ProposalPassed` events on the execution chain's governance.
    ChainBGovernance,
}

impl StreamId {
    /// The stable identifier used as part of the persisted keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChainALock => "chainA_lock",
            Self::ChainBBurn => "chainB_burn",
            Self::ChainBGovernance => "chainB_governance",
        }
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of source event a [`ProcessedKey`] refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum EventKind {
    /// A token lock on the settlement chain.
    Locked,
    /// A wrapped-token burn on the execution chain.
    Burned,
    /// A passed governance proposal on the execution chain.
    ProposalPassed,
}

impl EventKind {
    /// The stable identifier used as part of the persisted keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "Locked",
            Self::Burned => "Burned",
            Self::ProposalPassed => "ProposalPassed",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The composite primary key of the processed-events table.
///
/// Nonces are value-keyed: correctness never depends on the order they are
/// observed in, only on each (stream, nonce, kind) triple being acted upon
/// at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedKey {
    /// The stream the event was observed on.
    pub stream: StreamId,
    /// The event's nonce (or proposal id for governance events).
    pub nonce: U256,
    /// The kind of the event.
    pub kind: EventKind,
}

impl ProcessedKey {
    /// Creates a new key for the given stream, nonce and kind.
    pub fn new(stream: StreamId, nonce: U256, kind: EventKind) -> Self {
        Self {
            stream,
            nonce,
            kind,
        }
    }

    /// Returns the bytes of the key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(64);
        vec.extend_from_slice(self.stream.as_str().as_bytes());
        vec.push(b'/');
        let mut nonce_bytes = [0u8; 32];
        self.nonce.to_big_endian(&mut nonce_bytes);
        vec.extend_from_slice(&nonce_bytes);
        vec.push(b'/');
        vec.extend_from_slice(self.kind.as_str().as_bytes());
        vec
    }
}

impl Display for ProcessedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.stream, self.nonce, self.kind)
    }
}

/// The row recorded for each event that reached a terminal state.
///
/// `dest_tx_hash` is `None` when no destination transaction of our own was
/// mined for it: benign replays, rejected payloads and skipped governance
/// proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMark {
    /// Hash of the destination transaction, if one was mined.
    pub dest_tx_hash: Option<H256>,
    /// Unix timestamp (seconds) of when the mark was written.
    pub created_at: u64,
}

impl ProcessedMark {
    /// Creates a mark stamped with the current time.
    pub fn new(dest_tx_hash: Option<H256>) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            dest_tx_hash,
            created_at,
        }
    }
}

/// CursorStore is a simple trait for storing and retrieving the per-stream
/// block cursors used for recovery.
pub trait CursorStore: Clone + Send + Sync {
    /// Upserts the cursor for the stream and returns the stored value.
    ///
    /// Cursors never decrease: passing a block number lower than the current
    /// cursor leaves the stored value untouched.
    fn set_cursor(&self, stream: StreamId, block_number: u64)
        -> crate::Result<u64>;

    /// Get the last fully-scanned block number for the stream.
    /// Returns `0` if the stream has never been scanned.
    fn get_cursor(&self, stream: StreamId) -> crate::Result<u64>;
}

/// ProcessedStore records which events have already been acted upon, so that
/// retries and restarts never submit the same destination call twice.
pub trait ProcessedStore: Clone + Send + Sync {
    /// Insert-if-absent. Idempotent: marking an already-marked key succeeds
    /// silently and leaves the original row untouched.
    fn mark_processed(
        &self,
        key: &ProcessedKey,
        dest_tx_hash: Option<H256>,
    ) -> crate::Result<()>;

    /// Presence test on the processed-events table.
    fn is_processed(&self, key: &ProcessedKey) -> crate::Result<bool>;

    /// Fetch the full mark for a key, if any.
    fn get_processed(
        &self,
        key: &ProcessedKey,
    ) -> crate::Result<Option<ProcessedMark>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_keys_are_distinct_per_component() {
        let a = ProcessedKey::new(
            StreamId::ChainALock,
            U256::zero(),
            EventKind::Locked,
        );
        let b = ProcessedKey::new(
            StreamId::ChainBBurn,
            U256::zero(),
            EventKind::Burned,
        );
        let c = ProcessedKey::new(
            StreamId::ChainALock,
            U256::one(),
            EventKind::Locked,
        );
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_ne!(a.to_bytes(), c.to_bytes());
        assert_ne!(b.to_bytes(), c.to_bytes());
    }

    #[test]
    fn same_key_encodes_identically() {
        let nonce = U256::from(42u64);
        let a = ProcessedKey::new(
            StreamId::ChainBGovernance,
            nonce,
            EventKind::ProposalPassed,
        );
        let b = ProcessedKey::new(
            StreamId::ChainBGovernance,
            nonce,
            EventKind::ProposalPassed,
        );
        assert_eq!(a.to_bytes(), b.to_bytes());
    }
}
