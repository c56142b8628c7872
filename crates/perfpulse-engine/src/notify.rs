//! Lifecycle event fan-out.
//!
//! Publishing is best-effort: a failing channel is logged and never fails the
//! operation that produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use perfpulse_core::PulseEvent;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PulseEvent) -> Result<(), PublishError>;
}

/// In-process broadcast channel. Subscribers that fall behind lose the
/// oldest events and are expected to re-fetch state.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PulseEvent>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PulseEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &PulseEvent) -> Result<(), PublishError> {
        // No subscribers is not a failure.
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(event = event.kind(), "no event subscribers");
        }
        Ok(())
    }
}

/// Publishes to every registered channel, swallowing failures.
#[derive(Clone, Default)]
pub struct Notifier {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl Notifier {
    #[must_use]
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }

    #[must_use]
    pub fn single(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::new(vec![publisher])
    }

    pub async fn emit(&self, event: PulseEvent) {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(&event).await {
                tracing::warn!(
                    event = event.kind(),
                    slug = event.slug(),
                    error = %e,
                    "event publish failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}
