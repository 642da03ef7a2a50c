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

//! Chain client plumbing: provider and signer construction plus startup
//! readiness probing for the two ledgers the relayer bridges.

use std::time::Duration;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use std::sync::Arc;

use crate::error::Error;

/// Plain read-only client used for event queries and head-block polls.
pub type HttpProvider = Provider<Http>;
/// Shared handle to an [`HttpProvider`].
pub type HttpClient = Arc<HttpProvider>;
/// Signing client used for destination submissions.
pub type SignerClient = SignerMiddleware<HttpClient, LocalWallet>;

/// The two ledgers of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    /// The settlement chain, holding the token vault.
    A,
    /// The execution chain, holding the wrapped token and governance.
    B,
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::A => f.write_str("chainA"),
            Chain::B => f.write_str("chainB"),
        }
    }
}

/// Polls the endpoint's head block until it answers, up to `max_retries`
/// times with `interval` between attempts. Returns the head block observed.
pub async fn wait_ready(
    client: &HttpProvider,
    chain: Chain,
    max_retries: usize,
    interval: Duration,
) -> crate::Result<u64> {
    for attempt in 1..=max_retries {
        match client.get_block_number().await {
            Ok(head) => {
                tracing::debug!(%chain, head = head.as_u64(), "endpoint ready");
                return Ok(head.as_u64());
            }
            Err(e) => {
                tracing::debug!(
                    %chain,
                    attempt,
                    max_retries,
                    error = %e,
                    "endpoint not ready yet",
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
    Err(Error::ChainNotReady {
        chain,
        retries: max_retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_ready_gives_up_after_bounded_retries() {
        // nothing listens on this port.
        let provider =
            HttpProvider::try_from("http://127.0.0.1:1").unwrap();
        let result = wait_ready(
            &provider,
            Chain::A,
            2,
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::ChainNotReady { retries: 2, .. })
        ));
    }
}
