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

//! # Relayer Context Module
//!
//! The context owns the resolved configuration, the durable store handle and
//! the shutdown broadcast, and hands out chain clients built from them.

use std::sync::Arc;
use std::time::Duration;

use ethers::core::k256::SecretKey;
use ethers::middleware::SignerMiddleware;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use tokio::sync::{broadcast, Mutex};

use crate::chains::{Chain, HttpProvider, SignerClient};
use crate::config::RelayerConfig;
use crate::store::SledStore;

/// RelayerContext contains the relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: RelayerConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// When a task is spawned, it is passed a broadcast receiver handle.
    /// When a graceful shutdown is initiated, a `()` value is sent; each
    /// task receives it, reaches a safe terminal state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    store: SledStore,
    // one guard per destination chain so the account nonce stays strictly
    // increasing even when two pipelines target the same chain.
    chain_a_submit_lock: Arc<Mutex<()>>,
    chain_b_submit_lock: Arc<Mutex<()>>,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(config: RelayerConfig, store: SledStore) -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self {
            config,
            notify_shutdown,
            store,
            chain_a_submit_lock: Arc::new(Mutex::new(())),
            chain_b_submit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a read-only provider for the given chain.
    pub fn provider(&self, chain: Chain) -> crate::Result<HttpProvider> {
        let endpoint = match chain {
            Chain::A => &self.config.chain_a_rpc_url,
            Chain::B => &self.config.chain_b_rpc_url,
        };
        let provider = HttpProvider::try_from(endpoint.as_str())?
            .interval(Duration::from_millis(500));
        Ok(provider)
    }

    /// Builds a signing client for the given chain, binding the relayer key
    /// to the chain id reported by the endpoint.
    pub async fn signer(&self, chain: Chain) -> crate::Result<Arc<SignerClient>> {
        let provider = Arc::new(self.provider(chain)?);
        let chain_id = provider.get_chainid().await?;
        let key = SecretKey::from_bytes(
            self.config.deployer_private_key.as_fixed_bytes().into(),
        )?;
        let wallet = LocalWallet::from(key).with_chain_id(chain_id.as_u64());
        Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
    }

    /// The guard serialising destination submissions on the given chain.
    pub fn submit_lock(&self, chain: Chain) -> Arc<Mutex<()>> {
        match chain {
            Chain::A => self.chain_a_submit_lock.clone(),
            Chain::B => self.chain_b_submit_lock.clone(),
        }
    }

    /// Returns the [Sled](https://sled.rs)-based database store.
    pub fn store(&self) -> &SledStore {
        &self.store
    }
}

/// Listens for the shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value
/// is ever sent; once it has been received, every task should wind down.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received.
    shutdown: bool,
    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
