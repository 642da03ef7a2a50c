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

//! Typed bindings for the bridge contracts and the deployment-address files.
//!
//! The bindings are generated from the event/function surface the relayer
//! actually touches; each contract lives in its own module so the generated
//! error types do not collide.

use std::path::Path;
use std::time::Duration;

use ethers::types::Address;
use serde::Deserialize;

use crate::error::Error;

/// The settlement-chain vault holding the locked tokens.
pub mod token_vault {
    use ethers::contract::abigen;

    abigen!(
        TokenVault,
        r#"[
            event Locked(address indexed user, uint256 amount, uint256 nonce)
            function lock(uint256 amount)
            function unlock(address user, uint256 amount, uint256 nonce)
            function paused() view returns (bool)
            error NonceAlreadyProcessed(uint256 nonce)
            error ZeroAmount()
            error NotRelayer(address account)
            error BridgePaused()
        ]"#
    );
}

/// The execution-chain wrapped token minted against locked balances.
pub mod wrapped_token {
    use ethers::contract::abigen;

    abigen!(
        WrappedToken,
        r#"[
            event Burned(address indexed user, uint256 amount, uint256 nonce)
            function mintWrapped(address user, uint256 amount, uint256 nonce)
            function burn(uint256 amount)
            function balanceOf(address account) view returns (uint256)
            function totalSupply() view returns (uint256)
            error NonceAlreadyProcessed(uint256 nonce)
            error ZeroAmount()
            error NotRelayer(address account)
        ]"#
    );
}

/// The execution-chain governance that emits passed proposals.
pub mod governance {
    use ethers::contract::abigen;

    abigen!(
        Governance,
        r#"[
            event ProposalPassed(uint256 indexed proposalId, bytes data)
            function propose(bytes data) returns (uint256)
            function vote(uint256 proposalId)
            function execute(uint256 proposalId)
        ]"#
    );
}

/// The settlement-chain executor for emergency governance actions.
pub mod emergency_governor {
    use ethers::contract::abigen;

    abigen!(
        EmergencyGovernor,
        r#"[
            function pauseBridge()
            error NotRelayer(address account)
        ]"#
    );
}

/// Addresses of the contracts deployed on the settlement chain.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainADeployments {
    /// The token vault (lock / unlock).
    pub token_vault: Address,
    /// The emergency governor (pauseBridge).
    pub emergency_governor: Address,
}

/// Addresses of the contracts deployed on the execution chain.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBDeployments {
    /// The wrapped token (mintWrapped / burn).
    pub wrapped_token: Address,
    /// The governance contract.
    pub governance: Address,
}

/// The deployment-address files, read once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Deployments {
    /// Settlement-chain addresses from `chainA.json`.
    pub chain_a: ChainADeployments,
    /// Execution-chain addresses from `chainB.json`.
    pub chain_b: ChainBDeployments,
}

/// How long the supervisor waits for the deployment files to appear before
/// giving up. The deploy scripts run in a sibling container and may finish
/// after the relayer starts.
pub const DEPLOYMENTS_WAIT: Duration = Duration::from_secs(120);

const DEPLOYMENTS_POLL_INTERVAL: Duration = Duration::from_secs(2);

impl Deployments {
    /// Waits for `chainA.json` and `chainB.json` to appear under `dir`,
    /// then parses both. Fails after `timeout`.
    pub async fn load(dir: &Path, timeout: Duration) -> crate::Result<Self> {
        let chain_a_path = dir.join("chainA.json");
        let chain_b_path = dir.join("chainB.json");
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if chain_a_path.is_file() && chain_b_path.is_file() {
                let chain_a = read_json(&chain_a_path)?;
                let chain_b = read_json(&chain_b_path)?;
                tracing::debug!(
                    dir = %dir.display(),
                    "loaded deployment addresses",
                );
                return Ok(Self { chain_a, chain_b });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::DeploymentsNotFound {
                    path: dir.display().to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tracing::debug!(
                dir = %dir.display(),
                "waiting for deployment files to appear",
            );
            tokio::time::sleep(DEPLOYMENTS_POLL_INTERVAL).await;
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> crate::Result<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_files_parse() {
        let chain_a: ChainADeployments = serde_json::from_str(
            r#"{
                "tokenVault": "0xFBD61C9961e0bf872B5Ec041b718C0B2a106Ce9D",
                "emergencyGovernor": "0x626FEc5Ffa7Bf1EE8CEd7daBdE545630473E3ABb"
            }"#,
        )
        .unwrap();
        assert_ne!(chain_a.token_vault, Address::zero());
        assert_ne!(chain_a.emergency_governor, Address::zero());

        let chain_b: ChainBDeployments = serde_json::from_str(
            r#"{
                "wrappedToken": "0x979cBd4917e81447983ef87591B9E1ab21727a61",
                "governance": "0x7cd1F52e5EEdf753e99D945276a725CE533AaD1a"
            }"#,
        )
        .unwrap();
        assert_ne!(chain_b.wrapped_token, Address::zero());
        assert_ne!(chain_b.governance, Address::zero());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_deployments_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            Deployments::load(dir.path(), Duration::from_millis(10)).await;
        assert!(matches!(
            result,
            Err(Error::DeploymentsNotFound { .. })
        ));
    }
}
