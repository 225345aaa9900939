use std::sync::Arc;

use async_trait::async_trait;
use deck::ActionPayload;
use serde_json::Value;
use tracing::{info, warn};

use super::requested_command;
use crate::dispatcher::ActionHandler;
use crate::sync::text::TextSync;
use crate::sync::{self, ContentSync};

pub struct TextButton {
    action_id: String,
    engine: Arc<TextSync>,
}

impl TextButton {
    pub fn new(action_id: impl Into<String>, engine: Arc<TextSync>) -> Self {
        Self {
            action_id: action_id.into(),
            engine,
        }
    }

    fn spawn_press(&self, context: &str, payload: &ActionPayload) {
        let engine = Arc::clone(&self.engine);
        let context = context.to_string();
        let coordinates = payload.coordinates;
        tokio::spawn(async move {
            if let Err(error) = engine.press(&context, coordinates).await {
                warn!(context = %context, "button press failed: {}", error);
            }
        });
    }
}

#[async_trait]
impl ActionHandler for TextButton {
    fn action_id(&self) -> &str {
        &self.action_id
    }

    async fn will_appear(&self, context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
        sync::watch(&self.engine, context).await?;
        sync::spawn_appear(&self.engine, context.to_string());
        Ok(())
    }

    async fn will_disappear(
        &self,
        context: &str,
        _payload: &ActionPayload,
    ) -> anyhow::Result<()> {
        sync::unwatch(self.engine.as_ref(), context).await?;
        Ok(())
    }

    async fn did_receive_settings(
        &self,
        context: &str,
        _payload: &ActionPayload,
    ) -> anyhow::Result<()> {
        self.engine.poller().fingerprints.clear(context).await;
        sync::spawn_refresh(&self.engine, context.to_string(), true);
        sync::watch(&self.engine, context).await?;
        Ok(())
    }

    async fn key_up(&self, context: &str, payload: &ActionPayload) -> anyhow::Result<()> {
        self.spawn_press(context, payload);
        Ok(())
    }

    async fn touch_tap(&self, context: &str, payload: &ActionPayload) -> anyhow::Result<()> {
        self.spawn_press(context, payload);
        Ok(())
    }

    async fn send_to_plugin(&self, context: &str, payload: &Value) -> anyhow::Result<()> {
        if requested_command(payload) == Some("refreshText") {
            info!(context = %context, "text refresh requested");
            self.engine.poller().fingerprints.clear(context).await;
            sync::spawn_refresh(&self.engine, context.to_string(), true);
        }
        Ok(())
    }
}
