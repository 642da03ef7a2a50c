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

use derive_more::Display;

/// Target for logger
pub const TARGET: &str = "relayer_probe";

/// The Kind of the Probe.
///
/// Integration tests and operators grep structured log output for
/// `target=relayer_probe` records with one of these kinds.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Relayer sync state of one event stream.
    #[display(fmt = "sync")]
    Sync,
    /// A destination transaction submitted for an observed event.
    #[display(fmt = "relay")]
    Relay,
    /// When the relayer will retry a failed destination submission.
    #[display(fmt = "retry")]
    Retry,
    /// Periodic head-block report for each chain.
    #[display(fmt = "heartbeat")]
    Heartbeat,
}
