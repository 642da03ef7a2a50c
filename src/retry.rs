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

//! Retry policies for async calls.

use std::time::Duration;

use backoff::backoff::Backoff;

/// A backoff policy which always returns a constant duration, until it
/// exceeds the maximum retry count.
///
/// Used for the bounded destination-submission retry loop, where the interval
/// between attempts is fixed and the number of attempts is small.
#[derive(Debug)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new constant backoff that waits `interval` between retries
    /// and gives up after `max_retry_count` retries. Note that the initial
    /// attempt is not a retry, so a count of `n` allows `n + 1` attempts in
    /// total.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count < self.max_retry_count {
            self.count += 1;
            Some(self.interval)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_retry_count() {
        let mut policy =
            ConstantWithMaxRetryCount::new(Duration::from_secs(2), 2);
        assert_eq!(policy.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_backoff(), None);
        assert_eq!(policy.next_backoff(), None);
    }

    #[test]
    fn reset_allows_retrying_again() {
        let mut policy =
            ConstantWithMaxRetryCount::new(Duration::from_millis(100), 1);
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        policy.reset();
        assert!(policy.next_backoff().is_some());
    }
}
