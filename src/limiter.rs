//! Bounded-concurrency gate for async work.
//!
//! [`ExecutionLimiter`] admits at most `limit` task bodies at a time. When
//! a body finishes, its slot is handed directly to one queued caller, so a
//! newcomer can never slip in between release and wake-up.
//!
//! # Queueing disciplines
//!
//! - `race = true` (default): the most recently queued caller is admitted
//!   and every earlier queued caller is abandoned. Abandoned calls never
//!   resolve; only the latest request matters.
//! - `race = false`: queued callers are admitted first-in, first-out.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct LimiterState {
    running: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Async concurrency limiter with `race` or FIFO admission.
#[derive(Debug)]
pub struct ExecutionLimiter {
    limit: AtomicUsize,
    race: AtomicBool,
    state: Mutex<LimiterState>,
}

impl ExecutionLimiter {
    /// Creates a limiter. A `limit` of zero is raised to one.
    #[must_use]
    pub fn new(limit: usize, race: bool) -> Self {
        Self {
            limit: AtomicUsize::new(limit.max(1)),
            race: AtomicBool::new(race),
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Maximum number of concurrently admitted bodies.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Changes the limit for future admissions. Running bodies are never
    /// pre-empted. A `limit` of zero is raised to one.
    pub fn set_limit(&self, limit: usize) {
        if limit == 0 {
            tracing::warn!("limiter limit must be positive, using 1");
        }
        self.limit.store(limit.max(1), Ordering::Release);
    }

    /// Whether race admission is active.
    #[must_use]
    pub fn race(&self) -> bool {
        self.race.load(Ordering::Acquire)
    }

    /// Switches the admission discipline for future releases.
    pub fn set_race(&self, race: bool) {
        self.race.store(race, Ordering::Release);
    }

    /// Number of admitted bodies.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Number of callers waiting for admission.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Runs `task` once a slot is available and returns its output
    /// unchanged.
    ///
    /// Under race admission a queued call may be abandoned, in which case
    /// the returned future never completes.
    pub async fn run<F, Fut>(&self, task: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.acquire().await;
        let _slot = Slot { limiter: self };
        task().await
    }

    async fn acquire(&self) {
        let receiver = {
            let mut state = self.state.lock();
            if state.running < self.limit() {
                state.running += 1;
                return;
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            tracing::debug!(queued = state.waiters.len(), "limiter full, queueing caller");
            receiver
        };

        let mut waiter = Waiter {
            limiter: self,
            receiver: Some(receiver),
        };
        let handed_over = match waiter.receiver.as_mut() {
            Some(receiver) => receiver.await.is_ok(),
            None => false,
        };
        waiter.receiver = None;

        if !handed_over {
            tracing::debug!("queued caller abandoned by race admission");
            std::future::pending::<()>().await;
        }
    }

    /// Gives the slot of a finished body to the next waiter, or frees it.
    fn release(&self) {
        let mut state = self.state.lock();
        // Lowered limit: shrink before handing anything over.
        if state.running > self.limit() {
            state.running -= 1;
            return;
        }
        loop {
            let next = if self.race() {
                let latest = state.waiters.pop_back();
                if !state.waiters.is_empty() {
                    tracing::debug!(
                        abandoned = state.waiters.len(),
                        "race admission skipping stale callers"
                    );
                    state.waiters.clear();
                }
                latest
            } else {
                state.waiters.pop_front()
            };

            match next {
                Some(waiter) => {
                    if waiter.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.running = state.running.saturating_sub(1);
                    return;
                }
            }
        }
    }
}

impl Default for ExecutionLimiter {
    fn default() -> Self {
        Self::new(1, true)
    }
}

/// Releases the slot when the admitted body finishes, fails, panics or is
/// dropped.
struct Slot<'a> {
    limiter: &'a ExecutionLimiter,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// A queued caller. If it is dropped after a slot was handed to it but
/// before it resumed, the slot is passed on.
struct Waiter<'a> {
    limiter: &'a ExecutionLimiter,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take()
            && receiver.try_recv().is_ok()
        {
            self.limiter.release();
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn returns_task_output_and_error_unchanged() {
        let limiter = ExecutionLimiter::default();
        let ok: Result<u32, String> = limiter.run(|| async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u32, String> = limiter.run(|| async { Err("nope".to_string()) }).await;
        assert_eq!(err, Err("nope".to_string()));
        assert_eq!(limiter.running(), 0);
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let limiter = ExecutionLimiter::new(0, false);
        assert_eq!(limiter.limit(), 1);
        limiter.set_limit(0);
        assert_eq!(limiter.limit(), 1);
        limiter.set_limit(4);
        assert_eq!(limiter.limit(), 4);
        limiter.set_race(false);
        assert!(!limiter.race());
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_admits_at_most_limit_in_order() {
        let limiter = Arc::new(ExecutionLimiter::new(2, false));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..5u32 {
            let limiter = Arc::clone(&limiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let started = Arc::clone(&started);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(|| async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        if let Ok(mut started) = started.lock() {
                            started.push(id);
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        id
                    })
                    .await
            }));
            // Enqueue in a deterministic order.
            tokio::task::yield_now().await;
        }

        let mut results = Vec::new();
        for handle in handles {
            let Ok(id) = handle.await else {
                panic!("task panicked");
            };
            results.push(id);
        }

        assert_eq!(results, [0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        let started = started.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(started, [0, 1, 2, 3, 4]);
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn race_admits_latest_and_abandons_earlier_waiters() {
        let limiter = ExecutionLimiter::new(1, true);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut first = task::spawn(limiter.run(|| async move {
            let _ = release_rx.await;
            "first"
        }));
        let mut stale = task::spawn(limiter.run(|| async { "stale" }));
        let mut latest = task::spawn(limiter.run(|| async { "latest" }));

        assert_pending!(first.poll());
        assert_pending!(stale.poll());
        assert_pending!(latest.poll());
        assert_eq!(limiter.queued(), 2);

        let _ = release_tx.send(());
        assert!(first.is_woken());
        assert_eq!(assert_ready!(first.poll()), "first");

        assert!(latest.is_woken());
        assert_eq!(assert_ready!(latest.poll()), "latest");

        // The stale caller is woken by its dropped sender but never settles.
        assert_pending!(stale.poll());
        assert_pending!(stale.poll());
        assert_eq!(limiter.queued(), 0);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn fifo_releases_earliest_waiter() {
        let limiter = ExecutionLimiter::new(1, false);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut first = task::spawn(limiter.run(|| async move {
            let _ = release_rx.await;
            1
        }));
        let mut second = task::spawn(limiter.run(|| async { 2 }));
        let mut third = task::spawn(limiter.run(|| async { 3 }));

        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_pending!(third.poll());

        let _ = release_tx.send(());
        assert_eq!(assert_ready!(first.poll()), 1);
        assert!(second.is_woken());
        assert!(!third.is_woken());
        assert_eq!(assert_ready!(second.poll()), 2);
        assert_eq!(assert_ready!(third.poll()), 3);
    }

    #[tokio::test]
    async fn switching_to_fifo_applies_to_already_queued_callers() {
        let limiter = ExecutionLimiter::new(1, true);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut held = task::spawn(limiter.run(|| async move {
            let _ = release_rx.await;
            "held"
        }));
        let mut a = task::spawn(limiter.run(|| async { "a" }));
        let mut b = task::spawn(limiter.run(|| async { "b" }));
        assert_pending!(held.poll());
        assert_pending!(a.poll());
        assert_pending!(b.poll());
        assert_eq!(limiter.queued(), 2);

        limiter.set_race(false);
        let _ = release_tx.send(());
        assert_eq!(assert_ready!(held.poll()), "held");

        assert!(a.is_woken());
        assert!(!b.is_woken());
        assert_eq!(assert_ready!(a.poll()), "a");
        assert!(b.is_woken());
        assert_eq!(assert_ready!(b.poll()), "b");
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn dropped_body_releases_its_slot() {
        let limiter = ExecutionLimiter::new(1, false);
        {
            let mut blocked = task::spawn(limiter.run(std::future::pending::<()>));
            assert_pending!(blocked.poll());
            assert_eq!(limiter.running(), 1);
        }
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.run(|| async { 5 }).await, 5);
    }

    #[tokio::test]
    async fn raised_limit_applies_to_new_callers() {
        let limiter = ExecutionLimiter::new(1, false);
        let mut held = task::spawn(limiter.run(std::future::pending::<()>));
        assert_pending!(held.poll());

        limiter.set_limit(2);
        assert_eq!(limiter.run(|| async { "admitted" }).await, "admitted");
        assert_eq!(limiter.running(), 1);
    }

    #[tokio::test]
    async fn lowered_limit_shrinks_on_release() {
        let limiter = ExecutionLimiter::new(2, false);
        let mut a = task::spawn(limiter.run(std::future::pending::<()>));
        let mut b = task::spawn(limiter.run(std::future::pending::<()>));
        assert_pending!(a.poll());
        assert_pending!(b.poll());

        limiter.set_limit(1);
        let mut waiting = task::spawn(limiter.run(|| async { "late" }));
        assert_pending!(waiting.poll());

        drop(a);
        assert_eq!(limiter.running(), 1);
        assert!(!waiting.is_woken());

        drop(b);
        assert!(waiting.is_woken());
        assert_eq!(assert_ready!(waiting.poll()), "late");
    }
}
