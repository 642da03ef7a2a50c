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

//! The Governance → Emergency Action pipeline.
//!
//! Watches the execution chain's governance for `ProposalPassed` events and
//! dispatches the proposal's calldata to the matching emergency action on
//! the settlement chain. Proposals carrying a selector the relayer does not
//! know are recorded and skipped.

use std::ops;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::{Contract, EthCall};
use tokio::sync::Mutex;

use crate::chains::{HttpClient, HttpProvider, SignerClient};
use crate::config::EventsWatcherConfig;
use crate::contracts::emergency_governor::{
    EmergencyGovernor, NotRelayer, PauseBridgeCall,
};
use crate::contracts::governance::{Governance, ProposalPassedFilter};
use crate::error::Error;
use crate::store::{EventKind, ProcessedKey, SledStore, StreamId};

use super::{
    EventWatcher, RevertKind, SubmitOutcome, WatchableContract,
};

/// The emergency actions the relayer knows how to dispatch on the
/// settlement chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyAction {
    /// Pause the bridge vault.
    PauseBridge,
}

/// Resolves a proposal's function selector to an emergency action.
///
/// The selectors are recomputed from the canonical signatures rather than
/// hard-coded, so the table cannot silently drift from the contract ABI.
pub fn action_for_selector(selector: [u8; 4]) -> Option<EmergencyAction> {
    if selector == PauseBridgeCall::selector() {
        Some(EmergencyAction::PauseBridge)
    } else {
        None
    }
}

/// Decodes the action out of a proposal's calldata: the first four bytes
/// are the destination function selector.
pub fn decode_action(data: &[u8]) -> Option<EmergencyAction> {
    let selector: [u8; 4] = data.get(0..4)?.try_into().ok()?;
    action_for_selector(selector)
}

/// The watched side of the pipeline: the governance contract on the
/// execution chain.
#[derive(Clone, Debug)]
pub struct GovernanceContractWrapper {
    config: EventsWatcherConfig,
    contract: Governance<HttpProvider>,
}

impl GovernanceContractWrapper {
    /// Creates the wrapper over the governance deployed at `address`.
    pub fn new(
        address: ethers::types::Address,
        config: EventsWatcherConfig,
        client: HttpClient,
    ) -> Self {
        Self {
            contract: Governance::new(address, client),
            config,
        }
    }
}

impl ops::Deref for GovernanceContractWrapper {
    type Target = Contract<HttpProvider>;

    fn deref(&self) -> &Self::Target {
        &self.contract
    }
}

impl WatchableContract for GovernanceContractWrapper {
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

/// Relays passed proposals into emergency calls on the settlement chain.
pub struct ProposalPassedEventWatcher {
    dest: EmergencyGovernor<SignerClient>,
    submit_lock: Arc<Mutex<()>>,
}

impl ProposalPassedEventWatcher {
    /// Creates the watcher with its destination contract handle and the
    /// per-chain submission guard.
    pub fn new(
        dest: EmergencyGovernor<SignerClient>,
        submit_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self { dest, submit_lock }
    }
}

#[async_trait::async_trait]
impl EventWatcher for ProposalPassedEventWatcher {
    const TAG: &'static str = "Governance Events Watcher";
    const STREAM: StreamId = StreamId::ChainBGovernance;

    type Contract = GovernanceContractWrapper;
    type Events = ProposalPassedFilter;
    type Store = SledStore;

    fn dedup_key(&self, event: &Self::Events) -> ProcessedKey {
        ProcessedKey::new(
            Self::STREAM,
            event.proposal_id,
            EventKind::ProposalPassed,
        )
    }

    async fn submit(
        &self,
        event: &Self::Events,
    ) -> crate::Result<SubmitOutcome> {
        let Some(action) = decode_action(&event.data) else {
            tracing::warn!(
                proposal_id = %event.proposal_id,
                data = %hex::encode(&event.data),
                "proposal carries an unknown function selector, skipping",
            );
            return Ok(SubmitOutcome::Skipped);
        };
        let _guard = self.submit_lock.lock().await;
        match action {
            EmergencyAction::PauseBridge => {
                tracing::warn!(
                    proposal_id = %event.proposal_id,
                    "executing governance decision: pausing the bridge",
                );
                let call = self.dest.pause_bridge();
                let pending = call.send().await?;
                let receipt = pending.await?.ok_or(Error::TxDropped)?;
                Ok(SubmitOutcome::Mined(receipt.transaction_hash))
            }
        }
    }

    fn classify_revert(&self, err: &Error) -> RevertKind {
        let Error::EthersContractCallWithSigner(inner) = err else {
            return RevertKind::Other;
        };
        match inner.decode_revert::<NotRelayer>() {
            Some(_) => RevertKind::AccessControl,
            None => RevertKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_bridge_selector_matches_the_canonical_signature() {
        let canonical = ethers::core::utils::id("pauseBridge()");
        assert_eq!(PauseBridgeCall::selector(), canonical);
        // the deployed dispatch table entry.
        assert_eq!(canonical, [0x6b, 0x9a, 0x13, 0xe3]);
    }

    #[test]
    fn known_selector_dispatches_to_pause() {
        let mut data = PauseBridgeCall::selector().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        assert_eq!(decode_action(&data), Some(EmergencyAction::PauseBridge));
    }

    #[test]
    fn unknown_selector_is_skipped() {
        assert_eq!(decode_action(&[0xde, 0xad, 0xbe, 0xef]), None);
    }

    #[test]
    fn short_calldata_is_skipped() {
        assert_eq!(decode_action(&[]), None);
        assert_eq!(decode_action(&[0x6b, 0x9a]), None);
    }
}
