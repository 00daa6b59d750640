//! Suspension points shared by the 429 backoff and the inter-delete pacing.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately and remembers every requested delay.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingSleeper {
    slept: std::sync::Arc<tokio::sync::Mutex<Vec<Duration>>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().await.push(duration);
    }
}
