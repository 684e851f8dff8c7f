//! Broadcast racing
//!
//! A signed transaction is submitted on every configured channel at once.
//! The first confirmation wins and the other submissions are dropped.

use super::signer::SignedTransfer;
use crate::errors::BroadcastError;
use crate::services::Counters;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Resolve to the first `Ok` among `futures`, or every error if none succeed.
///
/// Losing futures are dropped as soon as a winner is found.
pub async fn first_success<I, F, T, E>(futures: I) -> Result<T, Vec<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<F> = futures.into_iter().collect();
    let mut errors = Vec::new();

    while let Some(result) = pending.next().await {
        match result {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e),
        }
    }

    Err(errors)
}

/// A landed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub signature: String,
    pub channel: &'static str,
    pub slot: Option<u64>,
}

/// One independent path for getting a transaction on chain
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound for submit plus confirmation on this channel
    fn timeout(&self) -> Duration;

    async fn submit(&self, transfer: &SignedTransfer) -> Result<Confirmation, BroadcastError>;
}

pub struct BroadcastRacer {
    channels: Vec<Arc<dyn BroadcastChannel>>,
    counters: Counters,
}

impl BroadcastRacer {
    pub fn new(channels: Vec<Arc<dyn BroadcastChannel>>, counters: Counters) -> Self {
        Self { channels, counters }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn broadcast(&self, transfer: &SignedTransfer) -> Result<Confirmation, BroadcastError> {
        if self.channels.is_empty() {
            return Err(BroadcastError::NoChannels);
        }

        let attempts = self.channels.iter().map(|channel| {
            let channel = channel.clone();
            async move {
                let limit = channel.timeout();
                match tokio::time::timeout(limit, channel.submit(transfer)).await {
                    Ok(result) => result,
                    Err(_) => Err(BroadcastError::Timeout {
                        channel: channel.name(),
                        seconds: limit.as_secs(),
                    }),
                }
            }
        });

        match first_success(attempts).await {
            Ok(confirmation) => {
                info!(
                    "[Racer] {} confirmed via {}",
                    confirmation.signature, confirmation.channel
                );
                self.counters.record_broadcast_win(confirmation.channel).await;
                Ok(confirmation)
            }
            Err(errors) => {
                for e in &errors {
                    debug!("[Racer] {}", e);
                }
                Err(BroadcastError::AllChannelsFailed(errors))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::future::ready;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel that answers after a fixed delay
    pub(crate) struct FakeChannel {
        pub name: &'static str,
        pub delay: Duration,
        pub timeout: Duration,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeChannel {
        pub fn new(name: &'static str, delay: Duration, timeout: Duration) -> Self {
            Self {
                name,
                delay,
                timeout,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BroadcastChannel for FakeChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn submit(&self, transfer: &SignedTransfer) -> Result<Confirmation, BroadcastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(BroadcastError::Rejected {
                    channel: self.name,
                    message: "rejected".to_string(),
                });
            }
            Ok(Confirmation {
                signature: format!("{}-{}", transfer.signature, self.name),
                channel: self.name,
                slot: Some(1),
            })
        }
    }

    fn transfer() -> SignedTransfer {
        SignedTransfer {
            signature: "sig".to_string(),
            wire: vec![0; 8],
        }
    }

    fn racer(channels: Vec<Arc<FakeChannel>>) -> (BroadcastRacer, Counters) {
        let counters = Counters::new();
        let channels = channels
            .into_iter()
            .map(|c| c as Arc<dyn BroadcastChannel>)
            .collect();
        (BroadcastRacer::new(channels, counters.clone()), counters)
    }

    #[tokio::test]
    async fn test_first_success_skips_errors() {
        let result: Result<u32, Vec<&str>> = first_success(vec![ready(Err("a")), ready(Ok(7))]).await;
        assert_eq!(result, Ok(7));

        let all_failed: Result<u32, Vec<&str>> = first_success(vec![ready(Err("x")), ready(Err("y"))]).await;
        let mut errors = all_failed.unwrap_err();
        errors.sort();
        assert_eq!(errors, vec!["x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_e_fast_channel_wins_while_slow_times_out() {
        let fast = Arc::new(FakeChannel::new("fast", Duration::from_secs(3), Duration::from_secs(10)));
        let slow = Arc::new(FakeChannel::new("slow", Duration::from_secs(60), Duration::from_secs(8)));
        let (racer, counters) = racer(vec![slow.clone(), fast.clone()]);

        let started = tokio::time::Instant::now();
        let confirmation = racer.broadcast(&transfer()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(confirmation.channel, "fast");
        assert_eq!(confirmation.signature, "sig-fast");
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert_eq!(counters.snapshot().await.broadcast_wins.get("fast"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_by_longest_timeout() {
        let a = Arc::new(FakeChannel::new("a", Duration::from_secs(100), Duration::from_secs(8)));
        let b = Arc::new(FakeChannel::new("b", Duration::from_secs(100), Duration::from_secs(12)));
        let (racer, _) = racer(vec![a, b]);

        let started = tokio::time::Instant::now();
        let err = racer.broadcast(&transfer()).await.unwrap_err();
        assert!(started.elapsed() <= Duration::from_secs(12) + Duration::from_millis(10));
        match err {
            BroadcastError::AllChannelsFailed(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| matches!(e, BroadcastError::Timeout { .. })));
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_channel_and_rejection() {
        let only = Arc::new(FakeChannel {
            fail: true,
            ..FakeChannel::new("direct", Duration::from_millis(10), Duration::from_secs(8))
        });
        let (single, _) = racer(vec![only.clone()]);
        assert!(matches!(
            single.broadcast(&transfer()).await,
            Err(BroadcastError::AllChannelsFailed(_))
        ));
        assert_eq!(only.calls(), 1);

        let (empty, _) = racer(Vec::new());
        assert!(matches!(empty.broadcast(&transfer()).await, Err(BroadcastError::NoChannels)));
    }
}
