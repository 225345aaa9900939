use std::sync::Arc;

use async_trait::async_trait;
use deck::ActionPayload;
use serde_json::Value;
use tracing::info;

use super::requested_command;
use crate::dispatcher::ActionHandler;
use crate::sync::image::ImageSync;
use crate::sync::{self, ContentSync};

pub struct ImageButton {
    action_id: String,
    engine: Arc<ImageSync>,
}

impl ImageButton {
    pub fn new(action_id: impl Into<String>, engine: Arc<ImageSync>) -> Self {
        Self {
            action_id: action_id.into(),
            engine,
        }
    }
}

#[async_trait]
impl ActionHandler for ImageButton {
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

    async fn send_to_plugin(&self, context: &str, payload: &Value) -> anyhow::Result<()> {
        if requested_command(payload) == Some("refreshImage") {
            info!(context = %context, "image refresh requested");
            self.engine.poller().fingerprints.clear(context).await;
            sync::spawn_refresh(&self.engine, context.to_string(), true);
        }
        Ok(())
    }
}
