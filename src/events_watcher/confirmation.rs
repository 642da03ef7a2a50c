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

//! The confirmation gate.
//!
//! An event is only relayed once its block is buried at least
//! `depth` blocks under the source chain's head, so that a shallow
//! reorganisation cannot drop an event we already acted upon. The gate keeps
//! no state; it is a pure function of (event block, current head, depth).

use std::time::Duration;

use ethers::providers::Middleware;

use crate::chains::HttpProvider;

/// How often the polling release mode re-reads the chain head.
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Whether an event mined at `event_block` is settled enough to relay,
/// given the current `head` and the configured `depth`.
pub fn confirmed(event_block: u64, head: u64, depth: u64) -> bool {
    head.saturating_sub(event_block) >= depth
}

/// Polling release mode: re-reads the head every
/// [`CONFIRMATION_POLL_INTERVAL`] until the event is confirmed, then returns
/// the head observed at that moment. There is no upper bound on the total
/// wait; the caller's task cancellation is the way out.
pub async fn wait_until_confirmed(
    client: &HttpProvider,
    event_block: u64,
    depth: u64,
) -> Result<u64, ethers::providers::ProviderError> {
    loop {
        let head = client.get_block_number().await?.as_u64();
        if confirmed(event_block, head, depth) {
            return Ok(head);
        }
        tracing::trace!(
            event_block,
            head,
            depth,
            "event not yet confirmed, waiting",
        );
        tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_depth_blocks_deep_is_confirmed() {
        let head = 55;
        let depth = 3;
        // event at head - depth is exactly deep enough,
        // one block later it is not.
        assert!(confirmed(head - depth, head, depth));
        assert!(!confirmed(head - depth + 1, head, depth));
    }

    #[test]
    fn zero_depth_confirms_the_head_block() {
        assert!(confirmed(10, 10, 0));
    }

    #[test]
    fn head_behind_event_never_confirms() {
        // a head temporarily behind the event's block (stale endpoint)
        // must not underflow into "confirmed".
        assert!(!confirmed(10, 8, 1));
        assert!(confirmed(10, 8, 0));
    }
}
