//! Frames the plugin sends to the host.

use serde_json::{Value, json};

use crate::error::Result;
use crate::types::Settings;

/// Which face a title or image update applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    Both,
    Hardware,
    Software,
}

impl Target {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Both => 0,
            Self::Hardware => 1,
            Self::Software => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Registration handshake; `event` is the host-supplied register event name.
    Register {
        event: String,
        uuid: String,
    },
    SetImage {
        context: String,
        image: String,
        target: Target,
    },
    SetTitle {
        context: String,
        title: String,
        target: Target,
    },
    SetState {
        context: String,
        state: u32,
    },
    SetSettings {
        context: String,
        settings: Settings,
    },
    GetSettings {
        context: String,
    },
    GetGlobalSettings {
        context: String,
    },
    SetGlobalSettings {
        context: String,
        settings: Settings,
    },
    SendToPropertyInspector {
        action: String,
        context: String,
        payload: Value,
    },
    OpenUrl {
        url: String,
    },
    LogMessage {
        message: String,
    },
}

impl OutboundMessage {
    pub fn set_image(context: impl Into<String>, image: impl Into<String>) -> Self {
        Self::SetImage {
            context: context.into(),
            image: image.into(),
            target: Target::Both,
        }
    }

    pub fn set_title(context: impl Into<String>, title: impl Into<String>) -> Self {
        Self::SetTitle {
            context: context.into(),
            title: title.into(),
            target: Target::Both,
        }
    }

    pub fn event_name(&self) -> &str {
        match self {
            Self::Register { event, .. } => event,
            Self::SetImage { .. } => "setImage",
            Self::SetTitle { .. } => "setTitle",
            Self::SetState { .. } => "setState",
            Self::SetSettings { .. } => "setSettings",
            Self::GetSettings { .. } => "getSettings",
            Self::GetGlobalSettings { .. } => "getGlobalSettings",
            Self::SetGlobalSettings { .. } => "setGlobalSettings",
            Self::SendToPropertyInspector { .. } => "sendToPropertyInspector",
            Self::OpenUrl { .. } => "openUrl",
            Self::LogMessage { .. } => "logMessage",
        }
    }

    /// Image frames are the only ones buffered while the transport is down.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::SetImage { .. })
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            Self::SetImage { context, .. }
            | Self::SetTitle { context, .. }
            | Self::SetState { context, .. }
            | Self::SetSettings { context, .. }
            | Self::GetSettings { context }
            | Self::GetGlobalSettings { context }
            | Self::SetGlobalSettings { context, .. }
            | Self::SendToPropertyInspector { context, .. } => Some(context),
            Self::Register { .. } | Self::OpenUrl { .. } | Self::LogMessage { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Register { event, uuid } => json!({"event": event, "uuid": uuid}),
            Self::SetImage {
                context,
                image,
                target,
            } => json!({
                "event": "setImage",
                "context": context,
                "payload": {"target": target.as_u8(), "image": image},
            }),
            Self::SetTitle {
                context,
                title,
                target,
            } => json!({
                "event": "setTitle",
                "context": context,
                "payload": {"title": title, "target": target.as_u8()},
            }),
            Self::SetState { context, state } => json!({
                "event": "setState",
                "context": context,
                "payload": {"state": state},
            }),
            Self::SetSettings { context, settings } => json!({
                "event": "setSettings",
                "context": context,
                "payload": settings,
            }),
            Self::GetSettings { context } => json!({"event": "getSettings", "context": context}),
            Self::GetGlobalSettings { context } => {
                json!({"event": "getGlobalSettings", "context": context})
            }
            Self::SetGlobalSettings { context, settings } => json!({
                "event": "setGlobalSettings",
                "context": context,
                "payload": settings,
            }),
            Self::SendToPropertyInspector {
                action,
                context,
                payload,
            } => json!({
                "event": "sendToPropertyInspector",
                "action": action,
                "context": context,
                "payload": payload,
            }),
            Self::OpenUrl { url } => json!({"event": "openUrl", "payload": {"url": url}}),
            Self::LogMessage { message } => {
                json!({"event": "logMessage", "payload": {"message": message}})
            }
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}
