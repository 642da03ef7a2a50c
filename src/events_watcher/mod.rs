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

//! # Events Watcher Module
//!
//! The per-stream pipelines of the relayer. Each pipeline owns a source
//! (chain + event type), a destination call, a retry policy and a persisted
//! cursor. The shared machinery lives in the [`EventWatcher`] trait:
//! implementors only provide the dedup key, the destination submission and
//! the revert classifier for their stream.

use std::cmp;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::contract::{Contract, EthEvent, LogMeta};
use ethers::providers::Middleware;
use ethers::types::Filter;
use futures::TryFutureExt;

use crate::chains::{HttpClient, HttpProvider};
use crate::error::Error;
use crate::probe;
use crate::retry::ConstantWithMaxRetryCount;
use crate::store::{CursorStore, ProcessedKey, ProcessedStore, StreamId};

pub mod confirmation;

mod lock_watcher;
pub use lock_watcher::*;

mod burn_watcher;
pub use burn_watcher::*;

mod governance_watcher;
pub use governance_watcher::*;

/// How many destination submissions are attempted per event before the
/// event is abandoned to a later pass.
pub const MAX_SUBMIT_ATTEMPTS: usize = 3;
/// How long to wait between submission attempts.
pub const SUBMIT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// A watchable contract is a contract used in the [`EventWatcher`].
pub trait WatchableContract: Send + Sync {
    /// The block number where this contract is deployed.
    fn deployed_at(&self) -> u64;

    /// How often this contract should be polled for events.
    fn polling_interval(&self) -> Duration;

    /// How many blocks to scan at one request.
    fn max_blocks_per_step(&self) -> u64;

    /// The frequency of printing the sync progress.
    fn print_progress_interval(&self) -> Duration;
}

/// What happened to a single destination submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The destination transaction was mined.
    Mined(ethers::types::H256),
    /// The destination rejected the nonce as already seen; the effect is
    /// already on chain, so this counts as done.
    AlreadyRelayed,
    /// The destination rejected the payload itself (e.g. a zero amount);
    /// resubmitting can never succeed.
    Rejected,
    /// The event carries nothing to execute (e.g. an unknown governance
    /// selector); record it and move on.
    Skipped,
}

/// The coarse classification of a failed destination submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    /// The destination replay map already contains this nonce.
    NonceAlreadyProcessed,
    /// The destination rejected the amount as zero.
    ZeroAmount,
    /// The relayer key lacks the required role on the destination.
    AccessControl,
    /// Anything else: transient RPC trouble or an unexpected revert.
    Other,
}

/// How [`EventWatcher::process`] left a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event reached a terminal state and is durably marked.
    Done,
    /// Not yet buried deep enough; a later pass will see it again.
    Deferred,
    /// All submission attempts failed; nothing was marked and the cursor
    /// must not move past this event.
    Abandoned,
}

/// A trait for watching one event stream on a source chain and relaying each
/// event to its destination chain exactly once.
#[async_trait::async_trait]
pub trait EventWatcher {
    /// A helper tag used to identify the event watcher in the logs.
    const TAG: &'static str;
    /// The stream this watcher owns: its cursor and processed marks.
    const STREAM: StreamId;
    /// The source contract that this event watcher is watching.
    type Contract: Deref<Target = Contract<HttpProvider>>
        + WatchableContract
        + 'static;
    /// The event type this watcher is interested in.
    type Events: EthEvent + Clone + Send + Sync + 'static;
    /// The storage backend holding this stream's cursor and marks.
    type Store: CursorStore + ProcessedStore + 'static;

    /// The deduplication key of an event: its value-keyed nonce plus the
    /// stream and kind it belongs to.
    fn dedup_key(&self, event: &Self::Events) -> ProcessedKey;

    /// Builds the destination call for the event, submits it with the
    /// relayer key and waits until it is mined.
    async fn submit(&self, event: &Self::Events) -> crate::Result<SubmitOutcome>;

    /// Classifies a failed submission. The default treats everything as
    /// retriable; implementors decode their destination contract's typed
    /// reverts here.
    fn classify_revert(&self, _err: &Error) -> RevertKind {
        RevertKind::Other
    }

    /// The critical section: takes one observed event through confirmation
    /// check, local dedup, the bounded submission retry loop, and durable
    /// acknowledgement.
    ///
    /// Store failures are returned as errors: without a working store the
    /// at-most-once guarantee is gone and the supervisor must stop.
    async fn process(
        &self,
        store: &Self::Store,
        event: &Self::Events,
        meta: &LogMeta,
        head_at_check: u64,
        depth: u64,
    ) -> crate::Result<ProcessOutcome> {
        let key = self.dedup_key(event);
        let event_block = meta.block_number.as_u64();
        if !confirmation::confirmed(event_block, head_at_check, depth) {
            tracing::debug!(
                tag = %Self::TAG,
                %key,
                event_block,
                head = head_at_check,
                depth,
                "event not yet confirmed",
            );
            return Ok(ProcessOutcome::Deferred);
        }
        if store.is_processed(&key)? {
            tracing::debug!(tag = %Self::TAG, %key, "event already processed");
            return Ok(ProcessOutcome::Done);
        }

        let policy = ConstantWithMaxRetryCount::new(
            SUBMIT_RETRY_INTERVAL,
            MAX_SUBMIT_ATTEMPTS.saturating_sub(1),
        );
        let attempt = || async {
            match self.submit(event).await {
                Ok(outcome) => Ok(outcome),
                Err(err) => match self.classify_revert(&err) {
                    RevertKind::NonceAlreadyProcessed => {
                        Ok(SubmitOutcome::AlreadyRelayed)
                    }
                    RevertKind::ZeroAmount => Ok(SubmitOutcome::Rejected),
                    RevertKind::AccessControl => {
                        Err(backoff::Error::permanent(err))
                    }
                    RevertKind::Other => Err(backoff::Error::transient(err)),
                },
            }
        };
        let notify = |err: Error, wait: Duration| {
            tracing::warn!(
                tag = %Self::TAG,
                %key,
                error = %err,
                retry_in_ms = wait.as_millis() as u64,
                "destination submission failed, will retry",
            );
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                stream = %Self::STREAM,
                nonce = %key.nonce,
            );
        };
        let outcome =
            backoff::future::retry_notify(policy, attempt, notify).await;

        match outcome {
            Ok(SubmitOutcome::Mined(tx_hash)) => {
                store.mark_processed(&key, Some(tx_hash))?;
                store.set_cursor(Self::STREAM, event_block)?;
                tracing::info!(
                    tag = %Self::TAG,
                    %key,
                    dest_tx = ?tx_hash,
                    "event relayed",
                );
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Relay,
                    stream = %Self::STREAM,
                    nonce = %key.nonce,
                    dest_tx = ?tx_hash,
                );
                Ok(ProcessOutcome::Done)
            }
            Ok(SubmitOutcome::AlreadyRelayed) => {
                // the destination effect is already on chain; record the
                // mark locally so restarts stop resubmitting.
                tracing::warn!(
                    tag = %Self::TAG,
                    %key,
                    "destination already saw this nonce, recording it locally",
                );
                store.mark_processed(&key, None)?;
                store.set_cursor(Self::STREAM, event_block)?;
                Ok(ProcessOutcome::Done)
            }
            Ok(SubmitOutcome::Rejected) => {
                tracing::error!(
                    tag = %Self::TAG,
                    %key,
                    "destination rejected the event payload; marking it so \
                     it is never resubmitted",
                );
                store.mark_processed(&key, None)?;
                Ok(ProcessOutcome::Done)
            }
            Ok(SubmitOutcome::Skipped) => {
                store.mark_processed(&key, None)?;
                Ok(ProcessOutcome::Done)
            }
            Err(err) => {
                tracing::error!(
                    tag = %Self::TAG,
                    %key,
                    error = %err,
                    attempts = MAX_SUBMIT_ATTEMPTS,
                    "giving up on event; operator attention required",
                );
                Ok(ProcessOutcome::Abandoned)
            }
        }
    }

    /// Recovery pass: scans the settled range between the persisted cursor
    /// and `head - depth`, processing every event found, then advances the
    /// cursor to the top of the scanned range.
    ///
    /// Events younger than the confirmation depth stay ahead of the cursor
    /// and are picked up by [`EventWatcher::watch`]. If an event is
    /// abandoned, the pass stops just below it so a later pass scans it
    /// again.
    #[tracing::instrument(skip_all, fields(tag = %Self::TAG))]
    async fn recover(
        &self,
        client: HttpClient,
        store: Arc<Self::Store>,
        contract: &Self::Contract,
        depth: u64,
    ) -> crate::Result<()> {
        let cursor = cmp::max(
            store.get_cursor(Self::STREAM)?,
            contract.deployed_at(),
        );
        let head = client.get_block_number().await?.as_u64();
        let settled = head.saturating_sub(depth);
        if cursor >= settled {
            tracing::debug!(cursor, head, "nothing to recover");
            return Ok(());
        }
        tracing::info!(
            from = cursor + 1,
            to = settled,
            head,
            "recovering missed events",
        );
        let step = cmp::max(contract.max_blocks_per_step(), 1);
        let mut from = cursor + 1;
        while from <= settled {
            let to = cmp::min(from.saturating_add(step - 1), settled);
            let filter =
                Filter::new().event(&Self::Events::abi_signature());
            let found_events = contract
                .event_with_filter::<Self::Events>(filter)
                .from_block(from)
                .to_block(to)
                .query_with_meta()
                .await?;
            tracing::trace!(
                from,
                to,
                count = found_events.len(),
                "scanned recovery range",
            );
            for (event, meta) in found_events {
                let outcome = self
                    .process(store.as_ref(), &event, &meta, head, depth)
                    .await?;
                if outcome == ProcessOutcome::Abandoned {
                    // stop the pass just below the abandoned event so the
                    // next pass observes it again.
                    let stop_at =
                        meta.block_number.as_u64().saturating_sub(1);
                    store.set_cursor(Self::STREAM, stop_at)?;
                    tracing::warn!(
                        stop_at,
                        "recovery stopped early at an abandoned event",
                    );
                    return Ok(());
                }
            }
            store.set_cursor(Self::STREAM, to)?;
            from = to + 1;
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            stream = %Self::STREAM,
            cursor = settled,
            head,
        );
        Ok(())
    }

    /// Live phase: continuously scans forward from the cursor, gates each
    /// found event through the polling confirmation mode, and processes it.
    ///
    /// Transient chain trouble restarts the loop through an unbounded
    /// exponential backoff; store failures end it, because the invariants
    /// cannot be maintained without a working store.
    #[tracing::instrument(skip_all, fields(tag = %Self::TAG))]
    async fn watch(
        &self,
        client: HttpClient,
        store: Arc<Self::Store>,
        contract: Self::Contract,
        depth: u64,
    ) -> crate::Result<()> {
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: None,
            ..Default::default()
        };
        let task = || async {
            let step = cmp::max(contract.max_blocks_per_step(), 1);
            // saves the last time we printed sync progress.
            let mut instant = Instant::now();
            loop {
                let block = cmp::max(
                    store
                        .get_cursor(Self::STREAM)
                        .map_err(backoff::Error::permanent)?,
                    contract.deployed_at(),
                );
                let head = client
                    .get_block_number()
                    .map_err(Error::from)
                    .map_err(backoff::Error::transient)
                    .await?
                    .as_u64();
                let dest_block = cmp::min(block.saturating_add(step), head);
                if dest_block > block {
                    let filter = Filter::new()
                        .event(&Self::Events::abi_signature());
                    let found_events = contract
                        .event_with_filter::<Self::Events>(filter)
                        .from_block(block + 1)
                        .to_block(dest_block)
                        .query_with_meta()
                        .map_err(Error::from)
                        .map_err(backoff::Error::transient)
                        .await?;
                    tracing::trace!(
                        from = block + 1,
                        to = dest_block,
                        count = found_events.len(),
                        "found new events",
                    );
                    for (event, meta) in found_events {
                        let head_now = confirmation::wait_until_confirmed(
                            &client,
                            meta.block_number.as_u64(),
                            depth,
                        )
                        .map_err(Error::from)
                        .map_err(backoff::Error::transient)
                        .await?;
                        let outcome = self
                            .process(
                                store.as_ref(),
                                &event,
                                &meta,
                                head_now,
                                depth,
                            )
                            .await
                            .map_err(backoff::Error::permanent)?;
                        if outcome == ProcessOutcome::Abandoned {
                            tracing::warn!(
                                "abandoned event, restarting event watcher",
                            );
                            return Err(backoff::Error::transient(
                                Error::ForceRestart,
                            ));
                        }
                    }
                    store
                        .set_cursor(Self::STREAM, dest_block)
                        .map_err(backoff::Error::permanent)?;
                }
                if dest_block == head {
                    let duration = contract.polling_interval();
                    tracing::trace!(
                        "cooldown a bit for {}ms",
                        duration.as_millis()
                    );
                    tokio::time::sleep(duration).await;
                }
                if contract.print_progress_interval()
                    != Duration::from_millis(0)
                    && instant.elapsed() > contract.print_progress_interval()
                {
                    tracing::info!(
                        cursor = dest_block,
                        head,
                        "sync progress",
                    );
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::Sync,
                        stream = %Self::STREAM,
                        cursor = dest_block,
                        head,
                    );
                    instant = Instant::now();
                }
            }
        };
        backoff::future::retry(backoff, task).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ethers::types::{Address, H256, U256, U64};

    use super::*;
    use crate::contracts::token_vault::LockedFilter;
    use crate::store::{EventKind, InMemoryStore};

    /// A pipeline whose submissions are driven from a script, so the
    /// critical section can be exercised without any chain.
    struct ScriptedWatcher {
        outcomes: Mutex<VecDeque<crate::Result<SubmitOutcome>>>,
        classify_as: RevertKind,
        calls: AtomicUsize,
    }

    impl ScriptedWatcher {
        fn new(
            outcomes: Vec<crate::Result<SubmitOutcome>>,
            classify_as: RevertKind,
        ) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                classify_as,
                calls: AtomicUsize::new(0),
            }
        }

        fn submissions(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Never instantiated: `process` does not touch the source contract.
    struct NeverContract;

    impl std::ops::Deref for NeverContract {
        type Target = Contract<HttpProvider>;

        fn deref(&self) -> &Self::Target {
            unreachable!("the scripted pipeline never queries its source")
        }
    }

    impl WatchableContract for NeverContract {
        fn deployed_at(&self) -> u64 {
            unreachable!()
        }

        fn polling_interval(&self) -> Duration {
            unreachable!()
        }

        fn max_blocks_per_step(&self) -> u64 {
            unreachable!()
        }

        fn print_progress_interval(&self) -> Duration {
            unreachable!()
        }
    }

    #[async_trait::async_trait]
    impl EventWatcher for ScriptedWatcher {
        const TAG: &'static str = "Scripted Watcher";
        const STREAM: StreamId = StreamId::ChainALock;

        type Contract = NeverContract;
        type Events = LockedFilter;
        type Store = InMemoryStore;

        fn dedup_key(&self, event: &Self::Events) -> ProcessedKey {
            ProcessedKey::new(Self::STREAM, event.nonce, EventKind::Locked)
        }

        async fn submit(
            &self,
            _event: &Self::Events,
        ) -> crate::Result<SubmitOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(Error::Generic("script exhausted")))
        }

        fn classify_revert(&self, _err: &Error) -> RevertKind {
            self.classify_as
        }
    }

    fn locked_event(nonce: u64, amount: u64) -> LockedFilter {
        LockedFilter {
            user: Address::repeat_byte(0x42),
            amount: U256::from(amount),
            nonce: U256::from(nonce),
        }
    }

    fn meta_at(block: u64) -> LogMeta {
        LogMeta {
            address: Address::zero(),
            block_number: U64::from(block),
            block_hash: H256::zero(),
            transaction_hash: H256::repeat_byte(0x01),
            transaction_index: U64::zero(),
            log_index: U256::zero(),
        }
    }

    #[tokio::test]
    async fn happy_path_marks_and_advances_the_cursor() {
        let dest_tx = H256::repeat_byte(0xaa);
        let watcher = ScriptedWatcher::new(
            vec![Ok(SubmitOutcome::Mined(dest_tx))],
            RevertKind::Other,
        );
        let store = InMemoryStore::default();
        let event = locked_event(0, 100);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 55, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Done);
        assert_eq!(watcher.submissions(), 1);

        let key = watcher.dedup_key(&event);
        let mark = store.get_processed(&key).unwrap().unwrap();
        assert_eq!(mark.dest_tx_hash, Some(dest_tx));
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 50);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn replayed_event_is_rejected_locally() {
        let watcher = ScriptedWatcher::new(
            vec![Ok(SubmitOutcome::Mined(H256::repeat_byte(0xaa)))],
            RevertKind::Other,
        );
        let store = InMemoryStore::default();
        let event = locked_event(0, 100);
        let meta = meta_at(50);

        let first =
            watcher.process(&store, &event, &meta, 60, 3).await.unwrap();
        let second =
            watcher.process(&store, &event, &meta, 60, 3).await.unwrap();
        assert_eq!(first, ProcessOutcome::Done);
        assert_eq!(second, ProcessOutcome::Done);
        // no second destination call was attempted.
        assert_eq!(watcher.submissions(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_event_is_deferred() {
        let watcher = ScriptedWatcher::new(vec![], RevertKind::Other);
        let store = InMemoryStore::default();
        let event = locked_event(1, 100);
        // two blocks deep with depth 3: not settled yet.
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 52, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Deferred);
        assert_eq!(watcher.submissions(), 0);
        assert!(!store.is_processed(&watcher.dedup_key(&event)).unwrap());
    }

    #[tokio::test]
    async fn benign_replay_revert_counts_as_success() {
        let watcher = ScriptedWatcher::new(
            vec![Err(Error::Generic("execution reverted"))],
            RevertKind::NonceAlreadyProcessed,
        );
        let store = InMemoryStore::default();
        let event = locked_event(2, 100);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 60, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Done);
        assert_eq!(watcher.submissions(), 1);
        // marked with the empty destination marker so restarts stop
        // resubmitting.
        let mark = store
            .get_processed(&watcher.dedup_key(&event))
            .unwrap()
            .unwrap();
        assert_eq!(mark.dest_tx_hash, None);
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 50);
    }

    #[tokio::test]
    async fn zero_amount_revert_is_marked_not_looped() {
        let watcher = ScriptedWatcher::new(
            vec![Err(Error::Generic("execution reverted"))],
            RevertKind::ZeroAmount,
        );
        let store = InMemoryStore::default();
        let event = locked_event(3, 0);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 60, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Done);
        assert_eq!(watcher.submissions(), 1);
        assert!(store.is_processed(&watcher.dedup_key(&event)).unwrap());
    }

    #[tokio::test]
    async fn access_control_revert_is_not_retried_or_marked() {
        let watcher = ScriptedWatcher::new(
            vec![Err(Error::Generic("execution reverted"))],
            RevertKind::AccessControl,
        );
        let store = InMemoryStore::default();
        let event = locked_event(4, 100);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 60, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Abandoned);
        assert_eq!(watcher.submissions(), 1);
        assert!(!store.is_processed(&watcher.dedup_key(&event)).unwrap());
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn transient_failures_are_retried_then_abandoned() {
        let watcher = ScriptedWatcher::new(
            vec![
                Err(Error::Generic("connection refused")),
                Err(Error::Generic("connection refused")),
                Err(Error::Generic("connection refused")),
            ],
            RevertKind::Other,
        );
        let store = InMemoryStore::default();
        let event = locked_event(5, 100);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 60, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Abandoned);
        assert_eq!(watcher.submissions(), MAX_SUBMIT_ATTEMPTS);
        // nothing marked and the cursor untouched: the event stays eligible
        // for the next pass.
        assert!(!store.is_processed(&watcher.dedup_key(&event)).unwrap());
        assert_eq!(store.get_cursor(StreamId::ChainALock).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_retry_can_still_succeed() {
        let dest_tx = H256::repeat_byte(0xcc);
        let watcher = ScriptedWatcher::new(
            vec![
                Err(Error::Generic("connection refused")),
                Ok(SubmitOutcome::Mined(dest_tx)),
            ],
            RevertKind::Other,
        );
        let store = InMemoryStore::default();
        let event = locked_event(6, 100);
        let outcome = watcher
            .process(&store, &event, &meta_at(50), 60, 3)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Done);
        assert_eq!(watcher.submissions(), 2);
    }

    #[tokio::test]
    async fn unknown_governance_selector_is_marked_once() {
        let watcher = ScriptedWatcher::new(
            vec![Ok(SubmitOutcome::Skipped)],
            RevertKind::Other,
        );
        let store = InMemoryStore::default();
        let event = locked_event(7, 100);
        let meta = meta_at(50);
        let first =
            watcher.process(&store, &event, &meta, 60, 3).await.unwrap();
        let second =
            watcher.process(&store, &event, &meta, 60, 3).await.unwrap();
        assert_eq!(first, ProcessOutcome::Done);
        assert_eq!(second, ProcessOutcome::Done);
        assert_eq!(watcher.submissions(), 1);
        assert!(store.is_processed(&watcher.dedup_key(&event)).unwrap());
    }
}
