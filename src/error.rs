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

//! Crate-wide error type.
//!
//! Every fallible operation in the relayer returns [`crate::Result`]; the
//! variants below are mostly transparent wrappers so that `?` works across
//! the store, the RPC clients and the configuration loader without manual
//! conversions.

use crate::chains::{Chain, HttpProvider, SignerClient};
use ethers::contract::ContractError;
use ethers::providers::ProviderError;
use ethers::signers::WalletError;

/// An enum of all possible errors that could be encountered during the
/// execution of the relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Error in the underlying Http provider.
    #[error(transparent)]
    EthersProvider(#[from] ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWallet(#[from] WalletError),
    /// Elliptic Curve error while loading the signing key.
    #[error(transparent)]
    EllipticCurve(#[from] ethers::core::k256::elliptic_curve::Error),
    /// Smart contract error while reading from a source chain.
    #[error(transparent)]
    EthersContractCall(#[from] ContractError<HttpProvider>),
    /// Smart contract error while submitting to a destination chain.
    #[error(transparent)]
    EthersContractCallWithSigner(#[from] ContractError<SignerClient>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// The chain endpoint did not answer a head-block query in time.
    #[error("{} endpoint not ready after {} attempts", chain, retries)]
    ChainNotReady {
        /// The chain whose endpoint never became reachable.
        chain: Chain,
        /// How many head-block queries were attempted.
        retries: usize,
    },
    /// The deployment-address files never appeared.
    #[error("deployment files missing under {} after waiting {}s", path, waited_secs)]
    DeploymentsNotFound {
        /// The directory that was polled for `chainA.json` / `chainB.json`.
        path: String,
        /// How long the supervisor waited before giving up.
        waited_secs: u64,
    },
    /// A submitted transaction never produced a receipt.
    #[error("transaction dropped from the mempool before being mined")]
    TxDropped,
    /// A background task failed and force restarted.
    #[error("task force restarted from an error")]
    ForceRestart,
}

/// A `Result` type alias over the relayer [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
