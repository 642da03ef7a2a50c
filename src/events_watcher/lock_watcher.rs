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

//! The Lock → Mint pipeline.
//!
//! Watches the settlement chain's token vault for `Locked` events and mints
//! the same amount of wrapped tokens to the same user on the execution
//! chain.

use std::ops;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::Contract;
use tokio::sync::Mutex;

use crate::chains::{HttpClient, HttpProvider, SignerClient};
use crate::config::EventsWatcherConfig;
use crate::contracts::token_vault::{LockedFilter, TokenVault};
use crate::contracts::wrapped_token::{WrappedToken, WrappedTokenErrors};
use crate::error::Error;
use crate::store::{EventKind, ProcessedKey, SledStore, StreamId};

use super::{
    EventWatcher, RevertKind, SubmitOutcome, WatchableContract,
};

/// The watched side of the pipeline: the token vault on the settlement
/// chain.
#[derive(Clone, Debug)]
pub struct TokenVaultContractWrapper {
    config: EventsWatcherConfig,
    contract: TokenVault<HttpProvider>,
}

impl TokenVaultContractWrapper {
    /// Creates the wrapper over the vault deployed at `address`.
    pub fn new(
        address: ethers::types::Address,
        config: EventsWatcherConfig,
        client: HttpClient,
    ) -> Self {
        Self {
            contract: TokenVault::new(address, client),
            config,
        }
    }
}

impl ops::Deref for TokenVaultContractWrapper {
    type Target = Contract<HttpProvider>;

    fn deref(&self) -> &Self::Target {
        &self.contract
    }
}

impl WatchableContract for TokenVaultContractWrapper {
    fn deployed_at(&self) -> u64 {
        self.config.deployed_at
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.config.polling_interval_ms)
    }

    fn max_blocks_per_step(&self) -> u64 {
        self.config.max_blocks_per_step
    }

    fn print_progress_interval(&self) -> Duration {
        Duration::from_millis(self.config.print_progress_interval_ms)
    }
}

/// Relays `Locked` events into `mintWrapped` calls on the execution chain.
pub struct LockedEventWatcher {
    dest: WrappedToken<SignerClient>,
    submit_lock: Arc<Mutex<()>>,
}

impl LockedEventWatcher {
    /// Creates the watcher with its destination contract handle and the
    /// per-chain submission guard.
    pub fn new(
        dest: WrappedToken<SignerClient>,
        submit_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self { dest, submit_lock }
    }
}

#[async_trait::async_trait]
impl EventWatcher for LockedEventWatcher {
    const TAG: &'static str = "Lock Events Watcher";
    const STREAM: StreamId = StreamId::ChainALock;

    type Contract = TokenVaultContractWrapper;
    type Events = LockedFilter;
    type Store = SledStore;

    fn dedup_key(&self, event: &Self::Events) -> ProcessedKey {
        ProcessedKey::new(Self::STREAM, event.nonce, EventKind::Locked)
    }

    async fn submit(
        &self,
        event: &Self::Events,
    ) -> crate::Result<SubmitOutcome> {
        // serialise submissions on the execution chain so the account nonce
        // stays strictly increasing.
        let _guard = self.submit_lock.lock().await;
        tracing::debug!(
            user = ?event.user,
            amount = %event.amount,
            nonce = %event.nonce,
            "minting wrapped tokens",
        );
        let call =
            self.dest
                .mint_wrapped(event.user, event.amount, event.nonce);
        let pending = call.send().await?;
        let receipt = pending.await?.ok_or(Error::TxDropped)?;
        Ok(SubmitOutcome::Mined(receipt.transaction_hash))
    }

    fn classify_revert(&self, err: &Error) -> RevertKind {
        let Error::EthersContractCallWithSigner(inner) = err else {
            return RevertKind::Other;
        };
        match inner.decode_contract_revert::<WrappedTokenErrors>() {
            Some(WrappedTokenErrors::NonceAlreadyProcessed(_)) => {
                RevertKind::NonceAlreadyProcessed
            }
            Some(WrappedTokenErrors::ZeroAmount(_)) => RevertKind::ZeroAmount,
            Some(WrappedTokenErrors::NotRelayer(_)) => {
                RevertKind::AccessControl
            }
            _ => RevertKind::Other,
        }
    }
}
