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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Vault Bridge Relayer
//!
//! The off-chain half of the vault bridge: a single-instance service that
//! observes events on two independent ledgers and submits the matching
//! transaction on the opposite one, exactly once per event.
//!
//! Three streams are relayed:
//!
//! * token locks on the settlement chain become wrapped-token mints on the
//!   execution chain,
//! * wrapped-token burns on the execution chain release the backing balance
//!   out of the settlement-chain vault,
//! * passed governance proposals on the execution chain trigger emergency
//!   actions (currently: pausing the bridge) on the settlement chain.
//!
//! Each stream persists a block cursor and a processed-events table in a
//! [sled](https://sled.rs) database, waits out a configurable confirmation
//! depth before acting on anything, and retries failed destination
//! submissions a bounded number of times. Together with the destination
//! contracts' per-nonce replay maps this yields exactly-once effects even
//! across crashes, restarts and re-observed events.

/// Chain client plumbing and shared type aliases.
pub mod chains;
/// Environment-sourced configuration.
pub mod config;
/// The relayer context: config, store and shutdown broadcast.
pub mod context;
/// Typed contract bindings and deployment-address files.
pub mod contracts;
/// The crate-wide error type.
pub mod error;
/// The per-stream event pipelines.
pub mod events_watcher;
/// Structured probe events for integration tests and operators.
pub mod probe;
/// Retry policies.
pub mod retry;
/// The supervisor wiring everything together.
pub mod service;
/// Durable and in-memory relayer stores.
pub mod store;

pub use error::{Error, Result};
