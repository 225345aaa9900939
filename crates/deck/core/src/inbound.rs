//! Inbound frame classification.
//!
//! Frames carrying an `action` field are bound to one key (`context`) and one
//! action type; everything else is plugin-level. Known event names decode into
//! typed payloads and fail closed when the payload is malformed. Unknown event
//! names decode to `Unknown(name)` so callers can treat them as a no-op.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::types::{
    Coordinates, DeviceInfo, Settings, TitleParameters, UserInfo, settings_or_empty,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    event: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    device_info: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Plugin(PluginMessage),
    Action(ActionMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginMessage {
    pub device: Option<String>,
    pub event: PluginEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    DidReceiveGlobalSettings {
        settings: Settings,
    },
    DeviceDidConnect {
        device: String,
        device_info: Option<DeviceInfo>,
    },
    DeviceDidDisconnect {
        device: String,
    },
    SendUserInfo(UserInfo),
    ApplicationDidLaunch {
        application: String,
    },
    ApplicationDidTerminate {
        application: String,
    },
    SystemDidWakeUp,
    Unknown(String),
}

impl PluginEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::DidReceiveGlobalSettings { .. } => "didReceiveGlobalSettings",
            Self::DeviceDidConnect { .. } => "deviceDidConnect",
            Self::DeviceDidDisconnect { .. } => "deviceDidDisconnect",
            Self::SendUserInfo(_) => "sendUserInfo",
            Self::ApplicationDidLaunch { .. } => "applicationDidLaunch",
            Self::ApplicationDidTerminate { .. } => "applicationDidTerminate",
            Self::SystemDidWakeUp => "systemDidWakeUp",
            Self::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionMessage {
    /// Action type id, e.g. `pro.popstas.httpbutton.httpButton`.
    pub action: String,
    /// Host-assigned key instance id.
    pub context: String,
    pub device: Option<String>,
    pub event: ActionEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    WillAppear(ActionPayload),
    WillDisappear(ActionPayload),
    DidReceiveSettings(ActionPayload),
    TitleParametersDidChange(TitlePayload),
    KeyDown(ActionPayload),
    KeyUp(ActionPayload),
    TouchTap(ActionPayload),
    SendToPlugin(Value),
    PropertyInspectorDidAppear,
    PropertyInspectorDidDisappear,
    Unknown(String),
}

impl ActionEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::WillAppear(_) => "willAppear",
            Self::WillDisappear(_) => "willDisappear",
            Self::DidReceiveSettings(_) => "didReceiveSettings",
            Self::TitleParametersDidChange(_) => "titleParametersDidChange",
            Self::KeyDown(_) => "keyDown",
            Self::KeyUp(_) => "keyUp",
            Self::TouchTap(_) => "touchTap",
            Self::SendToPlugin(_) => "sendToPlugin",
            Self::PropertyInspectorDidAppear => "propertyInspectorDidAppear",
            Self::PropertyInspectorDidDisappear => "propertyInspectorDidDisappear",
            Self::Unknown(name) => name,
        }
    }
}

/// Payload shared by appearance, settings and key events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    #[serde(default, deserialize_with = "settings_or_empty")]
    pub settings: Settings,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub state: Option<u32>,
    #[serde(default)]
    pub user_desired_state: Option<u32>,
    #[serde(default)]
    pub is_in_multi_action: bool,
    #[serde(default)]
    pub controller: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitlePayload {
    #[serde(default, deserialize_with = "settings_or_empty")]
    pub settings: Settings,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub state: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_parameters: TitleParameters,
}

#[derive(Debug, Deserialize)]
struct GlobalSettingsPayload {
    #[serde(default, deserialize_with = "settings_or_empty")]
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct ApplicationPayload {
    application: String,
}

/// Parse a text frame into a classified inbound message.
pub fn parse_inbound(text: &str) -> Result<InboundMessage> {
    let frame: RawFrame = serde_json::from_str(text)?;
    match frame.action.clone() {
        Some(action) => parse_action_frame(action, frame).map(InboundMessage::Action),
        None => parse_plugin_frame(frame).map(InboundMessage::Plugin),
    }
}

fn parse_action_frame(action: String, frame: RawFrame) -> Result<ActionMessage> {
    let context = frame.context.ok_or_else(|| ProtocolError::MissingField {
        event: frame.event.clone(),
        field: "context",
    })?;
    let name = frame.event.as_str();
    let payload = frame.payload;

    let event = match name {
        "willAppear" => ActionEvent::WillAppear(decode_payload(name, payload)?),
        "willDisappear" => ActionEvent::WillDisappear(decode_payload(name, payload)?),
        "didReceiveSettings" => ActionEvent::DidReceiveSettings(decode_payload(name, payload)?),
        "titleParametersDidChange" => {
            ActionEvent::TitleParametersDidChange(decode_payload(name, payload)?)
        }
        "keyDown" => ActionEvent::KeyDown(decode_payload(name, payload)?),
        "keyUp" => ActionEvent::KeyUp(decode_payload(name, payload)?),
        "touchTap" => ActionEvent::TouchTap(decode_payload(name, payload)?),
        "sendToPlugin" => match payload {
            Some(value @ Value::Object(_)) => ActionEvent::SendToPlugin(value),
            Some(_) => {
                return Err(ProtocolError::InvalidPayload {
                    event: name.to_string(),
                    message: "expected JSON object".to_string(),
                });
            }
            None => {
                return Err(ProtocolError::MissingField {
                    event: name.to_string(),
                    field: "payload",
                });
            }
        },
        "propertyInspectorDidAppear" => ActionEvent::PropertyInspectorDidAppear,
        "propertyInspectorDidDisappear" => ActionEvent::PropertyInspectorDidDisappear,
        other => ActionEvent::Unknown(other.to_string()),
    };

    Ok(ActionMessage {
        action,
        context,
        device: frame.device,
        event,
    })
}

fn parse_plugin_frame(frame: RawFrame) -> Result<PluginMessage> {
    let name = frame.event.as_str();
    let event = match name {
        "didReceiveGlobalSettings" => {
            let payload: GlobalSettingsPayload = decode_payload(name, frame.payload)?;
            PluginEvent::DidReceiveGlobalSettings {
                settings: payload.settings,
            }
        }
        "deviceDidConnect" => PluginEvent::DeviceDidConnect {
            device: require_device(name, frame.device.as_deref())?,
            device_info: frame
                .device_info
                .map(serde_json::from_value)
                .transpose()
                .map_err(|error| invalid_payload(name, &error))?,
        },
        "deviceDidDisconnect" => PluginEvent::DeviceDidDisconnect {
            device: require_device(name, frame.device.as_deref())?,
        },
        "sendUserInfo" => PluginEvent::SendUserInfo(decode_payload(name, frame.payload)?),
        "applicationDidLaunch" => {
            let payload: ApplicationPayload = decode_payload(name, frame.payload)?;
            PluginEvent::ApplicationDidLaunch {
                application: payload.application,
            }
        }
        "applicationDidTerminate" => {
            let payload: ApplicationPayload = decode_payload(name, frame.payload)?;
            PluginEvent::ApplicationDidTerminate {
                application: payload.application,
            }
        }
        "systemDidWakeUp" => PluginEvent::SystemDidWakeUp,
        other => PluginEvent::Unknown(other.to_string()),
    };

    Ok(PluginMessage {
        device: frame.device,
        event,
    })
}

fn decode_payload<T: DeserializeOwned>(event: &str, payload: Option<Value>) -> Result<T> {
    let payload = payload.ok_or_else(|| ProtocolError::MissingField {
        event: event.to_string(),
        field: "payload",
    })?;
    serde_json::from_value(payload).map_err(|error| invalid_payload(event, &error))
}

fn require_device(event: &str, device: Option<&str>) -> Result<String> {
    device
        .filter(|device| !device.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingField {
            event: event.to_string(),
            field: "device",
        })
}

fn invalid_payload(event: &str, error: &serde_json::Error) -> ProtocolError {
    ProtocolError::InvalidPayload {
        event: event.to_string(),
        message: error.to_string(),
    }
}
