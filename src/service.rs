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

//! The supervisor: wires configuration, store, chain clients and the three
//! event pipelines together, enforces the startup ordering (all recoveries
//! complete before any live watcher starts), and keeps the heartbeat going.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Middleware;
use tokio::sync::mpsc;

use crate::chains::{self, Chain, HttpClient};
use crate::context::{RelayerContext, Shutdown};
use crate::contracts::emergency_governor::EmergencyGovernor;
use crate::contracts::token_vault::TokenVault;
use crate::contracts::wrapped_token::WrappedToken;
use crate::contracts::{Deployments, DEPLOYMENTS_WAIT};
use crate::error::Error;
use crate::events_watcher::{
    BurnedEventWatcher, EventWatcher, GovernanceContractWrapper,
    LockedEventWatcher, ProposalPassedEventWatcher,
    TokenVaultContractWrapper, WrappedTokenContractWrapper,
};
use crate::probe;
use crate::store::SledStore;

/// How many head-block probes each endpoint gets before startup fails.
const READY_MAX_RETRIES: usize = 30;
/// How long to wait between readiness probes.
const READY_INTERVAL: Duration = Duration::from_secs(2);
/// How often the heartbeat reports the head block of each chain.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fires up all background services of the relayer.
///
/// Returns a channel carrying fatal task errors: anything received on it
/// means an invariant can no longer be maintained and the process should
/// exit non-zero. Startup failures (endpoint unreachable, deployment files
/// missing, store trouble) are returned directly.
pub async fn ignite(
    ctx: &RelayerContext,
    store: Arc<SledStore>,
) -> crate::Result<mpsc::Receiver<Error>> {
    let config = &ctx.config;
    let depth = config.confirmation_depth;

    let chain_a: HttpClient = Arc::new(ctx.provider(Chain::A)?);
    let chain_b: HttpClient = Arc::new(ctx.provider(Chain::B)?);
    chains::wait_ready(&chain_a, Chain::A, READY_MAX_RETRIES, READY_INTERVAL)
        .await?;
    chains::wait_ready(&chain_b, Chain::B, READY_MAX_RETRIES, READY_INTERVAL)
        .await?;

    let deployments =
        Deployments::load(&config.deployments_path, DEPLOYMENTS_WAIT).await?;

    let signer_a = ctx.signer(Chain::A).await?;
    let signer_b = ctx.signer(Chain::B).await?;
    let watcher_config = config.events_watcher.clone();

    // Lock → Mint: watch the vault on chain A, mint on chain B.
    let lock_wrapper = TokenVaultContractWrapper::new(
        deployments.chain_a.token_vault,
        watcher_config.clone(),
        chain_a.clone(),
    );
    let lock_watcher = LockedEventWatcher::new(
        WrappedToken::new(deployments.chain_b.wrapped_token, signer_b),
        ctx.submit_lock(Chain::B),
    );

    // Burn → Unlock: watch the wrapped token on chain B, unlock on chain A.
    let burn_wrapper = WrappedTokenContractWrapper::new(
        deployments.chain_b.wrapped_token,
        watcher_config.clone(),
        chain_b.clone(),
    );
    let burn_watcher = BurnedEventWatcher::new(
        TokenVault::new(deployments.chain_a.token_vault, signer_a.clone()),
        ctx.submit_lock(Chain::A),
    );

    // Governance → Emergency Action: watch proposals on chain B, execute on
    // chain A.
    let governance_wrapper = GovernanceContractWrapper::new(
        deployments.chain_b.governance,
        watcher_config,
        chain_b.clone(),
    );
    let governance_watcher = ProposalPassedEventWatcher::new(
        EmergencyGovernor::new(
            deployments.chain_a.emergency_governor,
            signer_a,
        ),
        ctx.submit_lock(Chain::A),
    );

    // run every recovery to completion before any live subscription starts,
    // so live scans always begin above the recovered cursors.
    lock_watcher
        .recover(chain_a.clone(), store.clone(), &lock_wrapper, depth)
        .await?;
    burn_watcher
        .recover(chain_b.clone(), store.clone(), &burn_wrapper, depth)
        .await?;
    governance_watcher
        .recover(chain_b.clone(), store.clone(), &governance_wrapper, depth)
        .await?;
    tracing::info!("recovery complete on all streams, going live");

    let (fatal_tx, fatal_rx) = mpsc::channel(4);
    spawn_watcher(
        lock_watcher,
        chain_a.clone(),
        store.clone(),
        lock_wrapper,
        depth,
        ctx.shutdown_signal(),
        fatal_tx.clone(),
    );
    spawn_watcher(
        burn_watcher,
        chain_b.clone(),
        store.clone(),
        burn_wrapper,
        depth,
        ctx.shutdown_signal(),
        fatal_tx.clone(),
    );
    spawn_watcher(
        governance_watcher,
        chain_b.clone(),
        store,
        governance_wrapper,
        depth,
        ctx.shutdown_signal(),
        fatal_tx,
    );

    spawn_heartbeat(chain_a, chain_b, ctx.shutdown_signal());
    Ok(fatal_rx)
}

/// Kicks off one live watcher, tied to the shutdown broadcast. A watcher
/// returning an error is fatal (transient trouble never escapes its own
/// backoff loop) and is forwarded to the supervisor.
fn spawn_watcher<W>(
    watcher: W,
    client: HttpClient,
    store: Arc<W::Store>,
    contract: W::Contract,
    depth: u64,
    mut shutdown_signal: Shutdown,
    fatal: mpsc::Sender<Error>,
) where
    W: EventWatcher + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tracing::debug!(tag = %W::TAG, "event watcher started");
        tokio::select! {
            result = watcher.watch(client, store, contract, depth) => {
                if let Err(e) = result {
                    tracing::error!(
                        tag = %W::TAG,
                        error = %e,
                        "event watcher failed fatally",
                    );
                    let _ = fatal.send(e).await;
                }
            }
            _ = shutdown_signal.recv() => {
                tracing::trace!(tag = %W::TAG, "event watcher stopped");
            }
        }
    });
}

/// Logs the head block of both chains every [`HEARTBEAT_INTERVAL`]. A failed
/// head query only warns; the heartbeat itself never gives up.
fn spawn_heartbeat(
    chain_a: HttpClient,
    chain_b: HttpClient,
    mut shutdown_signal: Shutdown,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (chain, client) in
                        [(Chain::A, &chain_a), (Chain::B, &chain_b)]
                    {
                        match client.get_block_number().await {
                            Ok(head) => {
                                tracing::info!(
                                    %chain,
                                    head = head.as_u64(),
                                    "heartbeat",
                                );
                                tracing::event!(
                                    target: probe::TARGET,
                                    tracing::Level::DEBUG,
                                    kind = %probe::Kind::Heartbeat,
                                    %chain,
                                    head = head.as_u64(),
                                );
                            }
                            Err(e) => tracing::warn!(
                                %chain,
                                error = %e,
                                "heartbeat head query failed",
                            ),
                        }
                    }
                }
                _ = shutdown_signal.recv() => break,
            }
        }
    });
}
