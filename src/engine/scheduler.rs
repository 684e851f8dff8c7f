//! Cancellable timer set owned by one engine run
//!
//! Dropping the scheduler (or calling [`Scheduler::cancel_all`]) aborts every
//! timer loop. Work a tick has already spawned is not affected.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub struct Scheduler {
    generation: u64,
    timers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            timers: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run `tick` every `period`. With `immediate` the first tick fires right
    /// away, otherwise after one full period.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, immediate: bool, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation;
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !immediate {
                timer.tick().await;
            }
            loop {
                timer.tick().await;
                debug!("[Scheduler] {} tick (generation {})", name, generation);
                tick().await;
            }
        });
        self.timers.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Abort every timer
    pub fn cancel_all(&mut self) {
        for (name, handle) in self.timers.drain(..) {
            handle.abort();
            debug!("[Scheduler] Cancelled {} (generation {})", name, self.generation);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(1);

        let counter = count.clone();
        scheduler.every("test", Duration::from_secs(10), true, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        scheduler.cancel_all();
        assert!(scheduler.is_empty());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_start_and_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut scheduler = Scheduler::new(2);
            let counter = count.clone();
            scheduler.every("delayed", Duration::from_secs(30), false, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });

            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(count.load(Ordering::SeqCst), 0);
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
