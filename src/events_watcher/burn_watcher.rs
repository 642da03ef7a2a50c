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

//! The Burn → Unlock pipeline.
//!
//! Watches the execution chain's wrapped token for `Burned` events and
//! releases the backing amount out of the settlement chain's vault.

use std::ops;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::Contract;
use tokio::sync::Mutex;

use crate::chains::{HttpClient, HttpProvider, SignerClient};
use crate::config::EventsWatcherConfig;
use crate::contracts::token_vault::{TokenVault, TokenVaultErrors};
use crate::contracts::wrapped_token::{BurnedFilter, WrappedToken};
use crate::error::Error;
use crate::store::{EventKind, ProcessedKey, SledStore, StreamId};

use super::{
    EventWatcher, RevertKind, SubmitOutcome, WatchableContract,
};

/// The watched side of the pipeline: the wrapped token on the execution
/// chain.
#[derive(Clone, Debug)]
pub struct WrappedTokenContractWrapper {
    config: EventsWatcherConfig,
    contract: WrappedToken<HttpProvider>,
}

impl WrappedTokenContractWrapper {
    /// Creates the wrapper over the wrapped token deployed at `address`.
    pub fn new(
        address: ethers::types::Address,
        config: EventsWatcherConfig,
        client: HttpClient,
    ) -> Self {
        Self {
            contract: WrappedToken::new(address, client),
            config,
        }
    }
}

impl ops::Deref for WrappedTokenContractWrapper {
    type Target = Contract<HttpProvider>;

    fn deref(&self) -> &Self::Target {
        &self.contract
    }
}

impl WatchableContract for WrappedTokenContractWrapper {
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

/// Relays `Burned` events into `unlock` calls on the settlement chain.
pub struct BurnedEventWatcher {
    dest: TokenVault<SignerClient>,
    submit_lock: Arc<Mutex<()>>,
}

impl BurnedEventWatcher {
    /// Creates the watcher with its destination contract handle and the
    /// per-chain submission guard.
    pub fn new(
        dest: TokenVault<SignerClient>,
        submit_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self { dest, submit_lock }
    }
}

#[async_trait::async_trait]
impl EventWatcher for BurnedEventWatcher {
    const TAG: &'static str = "Burn Events Watcher";
    const STREAM: StreamId = StreamId::ChainBBurn;

    type Contract = WrappedTokenContractWrapper;
    type Events = BurnedFilter;
    type Store = SledStore;

    fn dedup_key(&self, event: &Self::Events) -> ProcessedKey {
        ProcessedKey::new(Self::STREAM, event.nonce, EventKind::Burned)
    }

    async fn submit(
        &self,
        event: &Self::Events,
    ) -> crate::Result<SubmitOutcome> {
        let _guard = self.submit_lock.lock().await;
        tracing::debug!(
            user = ?event.user,
            amount = %event.amount,
            nonce = %event.nonce,
            "unlocking vault balance",
        );
        let call = self.dest.unlock(event.user, event.amount, event.nonce);
        let pending = call.send().await?;
        let receipt = pending.await?.ok_or(Error::TxDropped)?;
        Ok(SubmitOutcome::Mined(receipt.transaction_hash))
    }

    fn classify_revert(&self, err: &Error) -> RevertKind {
        let Error::EthersContractCallWithSigner(inner) = err else {
            return RevertKind::Other;
        };
        match inner.decode_contract_revert::<TokenVaultErrors>() {
            Some(TokenVaultErrors::NonceAlreadyProcessed(_)) => {
                RevertKind::NonceAlreadyProcessed
            }
            Some(TokenVaultErrors::ZeroAmount(_)) => RevertKind::ZeroAmount,
            Some(TokenVaultErrors::NotRelayer(_)) => {
                RevertKind::AccessControl
            }
            _ => RevertKind::Other,
        }
    }
}
