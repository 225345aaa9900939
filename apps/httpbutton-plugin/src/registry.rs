//! Live action instances, keyed by host context.

use std::collections::HashMap;
use std::sync::Arc;

use deck::{Coordinates, OutboundMessage, Settings, TitleParameters};
use serde_json::Value;
use tokio::sync::RwLock;

pub type SharedRegistry = Arc<RwLock<ActionRegistry>>;

/// One key bound to an action type.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInstance {
    pub action: String,
    pub context: String,
    pub settings: Settings,
    pub title: String,
    pub title_parameters: TitleParameters,
    pub coordinates: Option<Coordinates>,
}

impl ActionInstance {
    pub fn new(action: impl Into<String>, context: impl Into<String>, settings: Settings) -> Self {
        Self {
            action: action.into(),
            context: context.into(),
            settings,
            title: String::new(),
            title_parameters: TitleParameters::default(),
            coordinates: None,
        }
    }

    /// String setting, empty when absent or not a string.
    pub fn setting_str(&self, key: &str) -> &str {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn set_image(&self, image: impl Into<String>) -> OutboundMessage {
        OutboundMessage::set_image(self.context.clone(), image)
    }

    pub fn set_title(&self, title: impl Into<String>) -> OutboundMessage {
        OutboundMessage::set_title(self.context.clone(), title)
    }

    pub fn set_state(&self, state: u32) -> OutboundMessage {
        OutboundMessage::SetState {
            context: self.context.clone(),
            state,
        }
    }

    /// Store `settings` locally and build the frame that persists them on the host.
    pub fn set_settings(&mut self, settings: Settings) -> OutboundMessage {
        self.settings = settings.clone();
        OutboundMessage::SetSettings {
            context: self.context.clone(),
            settings,
        }
    }

    pub fn get_settings(&self) -> OutboundMessage {
        OutboundMessage::GetSettings {
            context: self.context.clone(),
        }
    }

    pub fn send_to_property_inspector(&self, payload: Value) -> OutboundMessage {
        OutboundMessage::SendToPropertyInspector {
            action: self.action.clone(),
            context: self.context.clone(),
            payload,
        }
    }

    pub fn open_url(&self, url: impl Into<String>) -> OutboundMessage {
        OutboundMessage::OpenUrl { url: url.into() }
    }
}

#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionInstance>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Register an instance. An existing entry for `context` is returned untouched.
    pub fn add_action(
        &mut self,
        action: &str,
        context: &str,
        settings: Settings,
    ) -> &mut ActionInstance {
        self.actions
            .entry(context.to_string())
            .or_insert_with(|| ActionInstance::new(action, context, settings))
    }

    pub fn del_action(&mut self, context: &str) -> Option<ActionInstance> {
        self.actions.remove(context)
    }

    pub fn get_action(&self, context: &str) -> Option<&ActionInstance> {
        self.actions.get(context)
    }

    pub fn get_action_mut(&mut self, context: &str) -> Option<&mut ActionInstance> {
        self.actions.get_mut(context)
    }

    /// All instances of one action type, ordered by context.
    pub fn get_actions(&self, action: &str) -> Vec<&ActionInstance> {
        let mut matching: Vec<_> = self
            .actions
            .values()
            .filter(|instance| instance.action == action)
            .collect();
        matching.sort_by(|left, right| left.context.cmp(&right.context));
        matching
    }

    pub fn contexts(&self) -> Vec<String> {
        let mut contexts: Vec<_> = self.actions.keys().cloned().collect();
        contexts.sort();
        contexts
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
