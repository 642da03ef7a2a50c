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

//! Relayer configuration, resolved from the process environment.
//!
//! Every setting has a default suitable for the local two-chain dev setup,
//! so a bare `vault-bridge-relayer` invocation works against
//! `http://localhost:8545` / `http://localhost:9545`.

use std::path::PathBuf;
use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

/// The well-known first dev-chain account key. Never fund this account on a
/// real network.
const DEV_SIGNING_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

const fn confirmation_depth_default() -> u64 {
    3
}

const fn deployed_at_default() -> u64 {
    0
}

const fn max_blocks_per_step_default() -> u64 {
    100
}

const fn polling_interval_default() -> u64 {
    2_000
}

const fn print_progress_interval_default() -> u64 {
    7_000
}

/// RelayerConfig is the configuration for the vault bridge relayer.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    /// Http(s) endpoint of the settlement chain (chain A).
    pub chain_a_rpc_url: url::Url,
    /// Http(s) endpoint of the execution chain (chain B).
    pub chain_b_rpc_url: url::Url,
    /// How many blocks an event must be buried under before it is relayed.
    #[serde(default = "confirmation_depth_default")]
    pub confirmation_depth: u64,
    /// Where the durable store lives on disk.
    pub db_path: PathBuf,
    /// The relayer signing key, shared across both chains.
    pub deployer_private_key: PrivateKey,
    /// Directory containing `chainA.json` and `chainB.json`.
    pub deployments_path: PathBuf,
    /// Tuning knobs for the event watchers.
    #[serde(default)]
    pub events_watcher: EventsWatcherConfig,
}

/// Tuning knobs shared by all event watchers.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsWatcherConfig {
    /// The block number the watched contracts were deployed at; scanning
    /// starts here when the store holds no cursor yet.
    #[serde(default = "deployed_at_default")]
    pub deployed_at: u64,
    /// How many blocks to fetch at one `eth_getLogs` request.
    #[serde(default = "max_blocks_per_step_default")]
    pub max_blocks_per_step: u64,
    /// How often to poll for new blocks once fully synced, in milliseconds.
    #[serde(default = "polling_interval_default")]
    pub polling_interval_ms: u64,
    /// The frequency of printing the sync progress, in milliseconds.
    /// Zero disables the progress log.
    #[serde(default = "print_progress_interval_default")]
    pub print_progress_interval_ms: u64,
}

impl Default for EventsWatcherConfig {
    fn default() -> Self {
        Self {
            deployed_at: deployed_at_default(),
            max_blocks_per_step: max_blocks_per_step_default(),
            polling_interval_ms: polling_interval_default(),
            print_progress_interval_ms: print_progress_interval_default(),
        }
    }
}

/// Loads the configuration from the environment, falling back to the
/// documented defaults for anything unset.
pub fn load() -> crate::Result<RelayerConfig> {
    let cfg = config::Config::builder()
        .set_default("chain_a_rpc_url", "http://localhost:8545")?
        .set_default("chain_b_rpc_url", "http://localhost:9545")?
        .set_default("db_path", "./relayer/data/relayer.db")?
        .set_default("deployer_private_key", DEV_SIGNING_KEY)?
        .set_default("deployments_path", "./deployments")?
        .add_source(config::Environment::default())
        .build()?;
    cfg.try_deserialize().map_err(Into::into)
}

/// PrivateKey represents the relayer signing key.
///
/// Accepted forms: a hex string (with or without the `0x` prefix), or
/// `$SOME_VAR` to read the hex string from another environment variable.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for PrivateKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(raw)
            .map_err(|e| format!("invalid hex private key: {e}"))?;
        if bytes.len() != 32 {
            return Err(format!(
                "expected a 32 byte private key but got {} bytes",
                bytes.len()
            ));
        }
        Ok(PrivateKey(H256::from_slice(&bytes)))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVisitor;
        impl serde::de::Visitor<'_> for PrivateKeyVisitor {
            type Value = PrivateKey;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if let Some(var) = value.strip_prefix('$') {
                    tracing::trace!("reading the signing key from ${}", var);
                    let resolved = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading the env var {var}: {e}",
                        ))
                    })?;
                    resolved.parse().map_err(serde::de::Error::custom)
                } else {
                    value.parse().map_err(serde::de::Error::custom)
                }
            }
        }

        deserializer.deserialize_str(PrivateKeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_parses_with_and_without_prefix() {
        let with_prefix: PrivateKey = DEV_SIGNING_KEY.parse().unwrap();
        let without_prefix: PrivateKey = DEV_SIGNING_KEY
            .strip_prefix("0x")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(*with_prefix, *without_prefix);
    }

    #[test]
    fn private_key_rejects_wrong_length() {
        assert!("0xdeadbeef".parse::<PrivateKey>().is_err());
        assert!("not-hex-at-all".parse::<PrivateKey>().is_err());
    }

    #[test]
    fn defaults_cover_the_local_dev_setup() {
        let cfg = load().unwrap();
        assert_eq!(cfg.chain_a_rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(cfg.chain_b_rpc_url.as_str(), "http://localhost:9545/");
        assert_eq!(cfg.confirmation_depth, 3);
        assert_eq!(cfg.deployments_path, PathBuf::from("./deployments"));
        assert_eq!(cfg.db_path, PathBuf::from("./relayer/data/relayer.db"));
    }
}
