//! Outbound send seam.

use std::sync::Arc;

use async_trait::async_trait;
use deck::OutboundMessage;
use tokio::sync::Mutex;

use crate::connection::SendOutcome;
use crate::error::Result;

/// Anything that can carry outbound frames to the host.
#[async_trait]
pub trait HostSink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<SendOutcome>;
}

/// In-memory sink that records every frame and reports it as sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all frames sent so far, oldest first.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Frames sent so far with the given event name.
    pub async fn sent_with_event(&self, event: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|message| message.event_name() == event)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl HostSink for RecordingSink {
    async fn send(&self, message: OutboundMessage) -> Result<SendOutcome> {
        self.sent.lock().await.push(message);
        Ok(SendOutcome::Sent)
    }
}
