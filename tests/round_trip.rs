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

//! End-to-end scenarios against two locally running dev chains.
//!
//! Assumes the local dev setup: the settlement chain on `:8545`, the
//! execution chain on `:9545` (both auto-mining), contracts deployed and
//! their addresses written under `./deployments`. The relayer signing key is
//! the default dev account, which also acts as the user here.
//!
//! Ignored by default; run manually with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use ethers::contract::EthCall;
use ethers::signers::Signer;
use ethers::types::{Bytes, U256};

use vault_bridge_relayer::chains::Chain;
use vault_bridge_relayer::config;
use vault_bridge_relayer::context::RelayerContext;
use vault_bridge_relayer::contracts::emergency_governor::PauseBridgeCall;
use vault_bridge_relayer::contracts::governance::Governance;
use vault_bridge_relayer::contracts::token_vault::TokenVault;
use vault_bridge_relayer::contracts::wrapped_token::WrappedToken;
use vault_bridge_relayer::contracts::Deployments;
use vault_bridge_relayer::service;
use vault_bridge_relayer::store::SledStore;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test]
#[ignore = "needs the two dev chains running with contracts deployed"]
async fn lock_mint_burn_unlock_round_trip() -> anyhow::Result<()> {
    let config = config::load()?;
    let deployments =
        Deployments::load(&config.deployments_path, Duration::from_secs(5))
            .await?;
    let store = SledStore::temporary()?;
    let ctx = RelayerContext::new(config, store.clone());
    let _fatal = service::ignite(&ctx, Arc::new(store)).await?;

    let user_a = ctx.signer(Chain::A).await?;
    let user_b = ctx.signer(Chain::B).await?;
    let user = user_a.signer().address();
    let vault = TokenVault::new(deployments.chain_a.token_vault, user_a);
    let wrapped =
        WrappedToken::new(deployments.chain_b.wrapped_token, user_b);

    let supply_before = wrapped.total_supply().call().await?;
    let balance_before = wrapped.balance_of(user).call().await?;
    let amount = U256::from(100u64);

    // lock on the settlement chain; the relayer should mint on the
    // execution chain once the event is buried deep enough.
    vault.lock(amount).send().await?.await?;
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        let balance = wrapped.balance_of(user).call().await?;
        if balance == balance_before + amount {
            break;
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "wrapped tokens were never minted",
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // burn the wrapped tokens back; the relayer should unlock the backing
    // balance and the wrapped supply should return to where it started.
    wrapped.burn(amount).send().await?.await?;
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        let supply = wrapped.total_supply().call().await?;
        if supply == supply_before {
            break;
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "wrapped supply never returned to its pre-round-trip value",
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

#[tokio::test]
#[ignore = "needs the two dev chains running with contracts deployed"]
async fn governance_pause_stops_the_vault() -> anyhow::Result<()> {
    let config = config::load()?;
    let deployments =
        Deployments::load(&config.deployments_path, Duration::from_secs(5))
            .await?;
    let store = SledStore::temporary()?;
    let ctx = RelayerContext::new(config, store.clone());
    let _fatal = service::ignite(&ctx, Arc::new(store)).await?;

    let voter = ctx.signer(Chain::B).await?;
    let governance = Governance::new(deployments.chain_b.governance, voter);

    // a proposal whose calldata is the pauseBridge() selector. The dev
    // governance has a single-voter quorum and this is its first proposal,
    // so it gets id 0.
    let calldata = Bytes::from(PauseBridgeCall::selector().to_vec());
    governance.propose(calldata).send().await?.await?;
    governance.vote(U256::zero()).send().await?.await?;
    governance.execute(U256::zero()).send().await?.await?;

    let relayer_a = ctx.signer(Chain::A).await?;
    let vault = TokenVault::new(deployments.chain_a.token_vault, relayer_a);
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        if vault.paused().call().await? {
            break;
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "the vault was never paused",
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // locking against a paused vault must revert.
    let call = vault.lock(U256::from(1u64));
    let result = call.send().await;
    anyhow::ensure!(result.is_err(), "lock succeeded on a paused vault");
    Ok(())
}
