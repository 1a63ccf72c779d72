// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cancellable timer tasks.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a spawned timer task. Dropping the handle cancels the task, so
/// replacing an `Option<TimerHandle>` always clears the old timer first.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    cancel_token: CancellationToken,
}

impl TimerHandle {
    /// Run `task` until it completes or the handle is dropped.
    pub(crate) fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = task_cancel.cancelled() => {}
                () = task => {}
            }
        });

        Self { cancel_token }
    }

    /// One-shot: run `task` after `delay`.
    pub(crate) fn after<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            sleep(delay).await;
            task.await;
        })
    }

    /// Repeating: call `tick` every `period`, first call one period from now.
    pub(crate) fn every<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tick();
            }
        })
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = TimerHandle::after(Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_skips_immediate_tick() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _handle = TimerHandle::every(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_secs(21)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
