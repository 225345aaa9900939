//! Routes inbound host frames to the registry and to action handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deck::{
    ActionEvent, ActionMessage, ActionPayload, DeviceInfo, InboundMessage, PluginEvent,
    PluginMessage, Settings, TitlePayload, UserInfo, parse_inbound,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::registry::SharedRegistry;

/// Behaviour for one action type. Every hook defaults to a no-op.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Full action id, e.g. `pro.popstas.httpbutton.httpButton`.
    fn action_id(&self) -> &str;

    async fn will_appear(&self, _context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
        Ok(())
    }

    async fn will_disappear(
        &self,
        _context: &str,
        _payload: &ActionPayload,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn did_receive_settings(
        &self,
        _context: &str,
        _payload: &ActionPayload,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn title_parameters_did_change(
        &self,
        _context: &str,
        _payload: &TitlePayload,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn key_down(&self, _context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
        Ok(())
    }

    async fn key_up(&self, _context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
        Ok(())
    }

    async fn touch_tap(&self, _context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_to_plugin(&self, _context: &str, _payload: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    async fn property_inspector_did_appear(&self, _context: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn property_inspector_did_disappear(&self, _context: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Observer for plugin-level frames, run after the built-in bookkeeping.
#[async_trait]
pub trait PluginHandler: Send + Sync {
    async fn on_plugin_event(
        &self,
        message: &PluginMessage,
        state: &PluginState,
    ) -> anyhow::Result<()>;
}

/// Plugin-wide data pushed by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginState {
    pub global_settings: Settings,
    pub devices: BTreeMap<String, DeviceInfo>,
    pub user_info: Option<UserInfo>,
}

impl PluginState {
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    fn apply(&mut self, event: &PluginEvent) {
        match event {
            PluginEvent::DidReceiveGlobalSettings { settings } => {
                self.global_settings = settings.clone();
            }
            PluginEvent::DeviceDidConnect {
                device,
                device_info,
            } => {
                self.devices
                    .insert(device.clone(), device_info.clone().unwrap_or_default());
            }
            PluginEvent::DeviceDidDisconnect { device } => {
                self.devices.remove(device);
            }
            PluginEvent::SendUserInfo(user_info) => {
                self.user_info = Some(user_info.clone());
            }
            _ => {}
        }
    }
}

pub struct Dispatcher {
    registry: SharedRegistry,
    handlers: Vec<Arc<dyn ActionHandler>>,
    plugin_handlers: Vec<Arc<dyn PluginHandler>>,
    state: RwLock<PluginState>,
}

impl Dispatcher {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            handlers: Vec::new(),
            plugin_handlers: Vec::new(),
            state: RwLock::new(PluginState::default()),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_plugin_handler(mut self, handler: Arc<dyn PluginHandler>) -> Self {
        self.plugin_handlers.push(handler);
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub async fn plugin_state(&self) -> PluginState {
        self.state.read().await.clone()
    }

    /// Parse and route one text frame. Malformed frames are logged and dropped.
    pub async fn dispatch_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(message) => self.dispatch(message).await,
            Err(error) => warn!("dropping inbound frame: {}", error),
        }
    }

    pub async fn dispatch(&self, message: InboundMessage) {
        match message {
            InboundMessage::Action(message) => self.dispatch_action(&message).await,
            InboundMessage::Plugin(message) => self.dispatch_plugin(&message).await,
        }
    }

    async fn dispatch_action(&self, message: &ActionMessage) {
        let handlers: Vec<_> = self
            .handlers
            .iter()
            .filter(|handler| handler.action_id() == message.action)
            .cloned()
            .collect();
        if handlers.is_empty() {
            debug!(
                action = %message.action,
                event = message.event.name(),
                "no handler for action"
            );
            return;
        }

        self.apply_lifecycle(message).await;
        for handler in handlers {
            if let Err(error) = invoke(handler.as_ref(), message).await {
                warn!(
                    context = %message.context,
                    event = message.event.name(),
                    "action handler failed: {:#}",
                    error
                );
            }
        }
    }

    async fn apply_lifecycle(&self, message: &ActionMessage) {
        let mut registry = self.registry.write().await;
        match &message.event {
            ActionEvent::WillAppear(payload) => {
                let instance =
                    registry.add_action(&message.action, &message.context, payload.settings.clone());
                if payload.coordinates.is_some() {
                    instance.coordinates = payload.coordinates;
                }
            }
            ActionEvent::WillDisappear(_) => {
                registry.del_action(&message.context);
            }
            ActionEvent::DidReceiveSettings(payload) => {
                match registry.get_action_mut(&message.context) {
                    Some(instance) => instance.settings = payload.settings.clone(),
                    None => debug!(context = %message.context, "settings for unknown instance"),
                }
            }
            ActionEvent::TitleParametersDidChange(payload) => {
                if let Some(instance) = registry.get_action_mut(&message.context) {
                    instance.title = payload.title.clone();
                    instance.title_parameters = payload.title_parameters.clone();
                }
            }
            _ => {}
        }
    }

    async fn dispatch_plugin(&self, message: &PluginMessage) {
        let snapshot = {
            let mut state = self.state.write().await;
            state.apply(&message.event);
            state.clone()
        };
        if let PluginEvent::Unknown(name) = &message.event {
            debug!(event = %name, "ignoring unknown plugin event");
        }
        for handler in &self.plugin_handlers {
            if let Err(error) = handler.on_plugin_event(message, &snapshot).await {
                warn!(
                    event = message.event.name(),
                    "plugin handler failed: {:#}",
                    error
                );
            }
        }
    }
}

async fn invoke(handler: &dyn ActionHandler, message: &ActionMessage) -> anyhow::Result<()> {
    let context = message.context.as_str();
    match &message.event {
        ActionEvent::WillAppear(payload) => handler.will_appear(context, payload).await,
        ActionEvent::WillDisappear(payload) => handler.will_disappear(context, payload).await,
        ActionEvent::DidReceiveSettings(payload) => {
            handler.did_receive_settings(context, payload).await
        }
        ActionEvent::TitleParametersDidChange(payload) => {
            handler.title_parameters_did_change(context, payload).await
        }
        ActionEvent::KeyDown(payload) => handler.key_down(context, payload).await,
        ActionEvent::KeyUp(payload) => handler.key_up(context, payload).await,
        ActionEvent::TouchTap(payload) => handler.touch_tap(context, payload).await,
        ActionEvent::SendToPlugin(payload) => handler.send_to_plugin(context, payload).await,
        ActionEvent::PropertyInspectorDidAppear => {
            handler.property_inspector_did_appear(context).await
        }
        ActionEvent::PropertyInspectorDidDisappear => {
            handler.property_inspector_did_disappear(context).await
        }
        ActionEvent::Unknown(name) => {
            debug!(context = %context, event = %name, "ignoring unknown action event");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActionRegistry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        id: String,
        calls: Mutex<Vec<String>>,
        fail_on_key_up: bool,
    }

    impl Recorder {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                ..Self::default()
            })
        }

        fn record(&self, call: String) {
            self.calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        fn action_id(&self) -> &str {
            &self.id
        }

        async fn will_appear(&self, context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
            self.record(format!("willAppear:{context}"));
            Ok(())
        }

        async fn key_up(&self, context: &str, _payload: &ActionPayload) -> anyhow::Result<()> {
            self.record(format!("keyUp:{context}"));
            if self.fail_on_key_up {
                anyhow::bail!("press failed");
            }
            Ok(())
        }

        async fn send_to_plugin(&self, context: &str, payload: &Value) -> anyhow::Result<()> {
            self.record(format!("sendToPlugin:{context}:{payload}"));
            Ok(())
        }
    }

    fn frame(event: &str, action: &str, context: &str, payload: &str) -> String {
        format!(
            r#"{{"event":"{event}","action":"{action}","context":"{context}","payload":{payload}}}"#
        )
    }

    #[tokio::test]
    async fn lifecycle_runs_before_handlers() {
        let registry = ActionRegistry::shared();
        let handler = Recorder::new("p.text");
        let dispatcher = Dispatcher::new(registry.clone()).with_handler(handler.clone());

        dispatcher
            .dispatch_text(&frame(
                "willAppear",
                "p.text",
                "k1",
                r#"{"settings":{"mdFilePath":"a.md"},"coordinates":{"column":2,"row":1}}"#,
            ))
            .await;
        {
            let registry = registry.read().await;
            let instance = registry.get_action("k1");
            assert_eq!(instance.map(|i| i.setting_str("mdFilePath")), Some("a.md"));
            assert_eq!(
                instance.and_then(|i| i.coordinates).map(|c| c.key_index(5)),
                Some(8)
            );
        }

        dispatcher
            .dispatch_text(&frame(
                "didReceiveSettings",
                "p.text",
                "k1",
                r#"{"settings":{"mdFilePath":"b.md"}}"#,
            ))
            .await;
        dispatcher
            .dispatch_text(&frame(
                "titleParametersDidChange",
                "p.text",
                "k1",
                r#"{"title":"Hi","titleParameters":{"fontSize":12}}"#,
            ))
            .await;
        {
            let registry = registry.read().await;
            let instance = registry.get_action("k1");
            assert_eq!(instance.map(|i| i.setting_str("mdFilePath")), Some("b.md"));
            assert_eq!(instance.map(|i| i.title.as_str()), Some("Hi"));
            assert_eq!(instance.map(|i| i.title_parameters.font_size), Some(12));
        }

        dispatcher
            .dispatch_text(&frame("willDisappear", "p.text", "k1", "{}"))
            .await;
        assert!(registry.read().await.is_empty());
        assert_eq!(handler.calls(), vec!["willAppear:k1"]);
    }

    #[tokio::test]
    async fn mismatched_and_malformed_frames_are_ignored() {
        let registry = ActionRegistry::shared();
        let handler = Recorder::new("p.text");
        let dispatcher = Dispatcher::new(registry.clone()).with_handler(handler.clone());

        dispatcher
            .dispatch_text(&frame("willAppear", "p.other", "k1", "{}"))
            .await;
        dispatcher.dispatch_text("not json").await;
        dispatcher
            .dispatch_text(&frame("keyUp", "p.text", "k1", r#""pressed""#))
            .await;
        dispatcher
            .dispatch_text(&frame("dialRotate", "p.text", "k1", "{}"))
            .await;

        assert!(registry.read().await.is_empty());
        assert!(handler.calls().is_empty());
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_dispatch() {
        let registry = ActionRegistry::shared();
        let failing = Arc::new(Recorder {
            id: "p.text".to_string(),
            fail_on_key_up: true,
            ..Recorder::default()
        });
        let second = Recorder::new("p.text");
        let dispatcher = Dispatcher::new(registry)
            .with_handler(failing.clone())
            .with_handler(second.clone());

        dispatcher
            .dispatch_text(&frame("keyUp", "p.text", "k1", "{}"))
            .await;
        dispatcher
            .dispatch_text(&frame(
                "sendToPlugin",
                "p.text",
                "k1",
                r#"{"action":"refreshText"}"#,
            ))
            .await;

        assert_eq!(
            failing.calls(),
            vec![
                "keyUp:k1".to_string(),
                r#"sendToPlugin:k1:{"action":"refreshText"}"#.to_string()
            ]
        );
        assert_eq!(second.calls().len(), 2);
    }

    #[tokio::test]
    async fn plugin_events_maintain_state() {
        let dispatcher = Dispatcher::new(ActionRegistry::shared());
        dispatcher
            .dispatch_text(r#"{"event":"didReceiveGlobalSettings","payload":{"settings":{"theme":"dark"}}}"#)
            .await;
        dispatcher
            .dispatch_text(r#"{"event":"deviceDidConnect","device":"dev-1","deviceInfo":{"name":"Deck","type":0,"size":{"columns":5,"rows":3}}}"#)
            .await;
        dispatcher
            .dispatch_text(r#"{"event":"deviceDidConnect","device":"dev-2"}"#)
            .await;
        dispatcher
            .dispatch_text(r#"{"event":"deviceDidDisconnect","device":"dev-2"}"#)
            .await;
        dispatcher
            .dispatch_text(r#"{"event":"systemDidWakeUp"}"#)
            .await;

        let state = dispatcher.plugin_state().await;
        assert_eq!(
            state.global_settings.get("theme").and_then(Value::as_str),
            Some("dark")
        );
        assert_eq!(state.device_ids(), vec!["dev-1"]);
        assert_eq!(state.devices.get("dev-1").map(|d| d.size.columns), Some(5));
        assert_eq!(state.user_info, None);
    }
}
