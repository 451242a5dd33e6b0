//! How the engine waits out logical time.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer. Used against real programs, which need wall
/// time to react to input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately and only tallies what it was asked to wait.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    calls: AtomicU64,
    total_nanos: AtomicU64,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.total_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}
