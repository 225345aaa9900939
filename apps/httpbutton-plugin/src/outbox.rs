//! Outbound command path from actions to the host.

use std::sync::Arc;

use deck::OutboundMessage;
use deck_client::{ClientError, HostSink, SendOutcome};
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{HttpClient, HttpError};
use crate::imaging;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error("image source fetch failed: {0}")]
    Fetch(#[from] HttpError),
    #[error("image source read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Clone)]
pub struct Outbox {
    sink: Arc<dyn HostSink>,
    http: HttpClient,
}

impl Outbox {
    pub fn new(sink: Arc<dyn HostSink>, http: HttpClient) -> Self {
        Self { sink, http }
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<SendOutcome, ClientError> {
        let event = message.event_name().to_string();
        let outcome = self.sink.send(message).await?;
        if outcome == SendOutcome::Dropped {
            debug!("{} dropped while host connection is closed", event);
        }
        Ok(outcome)
    }

    /// Push a key image. `data:` URLs go straight out (the connection queues
    /// them while closed); anything else is loaded as a URL or file path and
    /// re-encoded as a PNG data URL first.
    pub async fn set_image(
        &self,
        context: &str,
        image: &str,
    ) -> Result<SendOutcome, OutboxError> {
        let payload = if image.starts_with("data:") {
            image.to_string()
        } else {
            self.render_source(image).await?
        };
        Ok(self
            .send(OutboundMessage::set_image(context, payload))
            .await?)
    }

    async fn render_source(&self, source: &str) -> Result<String, OutboxError> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            self.http.get_bytes(source, None).await?
        } else {
            tokio::fs::read(source).await?
        };
        let decoded = imaging::decode(&bytes)?;
        let png = imaging::encode_png(&decoded.to_rgba8()).inspect_err(|error| {
            warn!("failed to encode {} as PNG: {}", source, error);
        })?;
        Ok(imaging::png_data_url(&png))
    }
}
