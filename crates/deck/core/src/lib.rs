//! Host protocol primitives for StreamDock / Stream Deck plugins.
//!
//! The host device manager talks to a plugin over a local WebSocket using JSON
//! frames of the shape `{event, action?, context?, device?, payload?}`.
//!
//! Internal module boundaries:
//! - `inbound`: frame classification into closed plugin-level / action-level event sets
//! - `outbound`: frames the plugin sends to the host
//! - `launch`: host-supplied startup arguments (`-port`, `-pluginUUID`, ...)
//! - `types`: payload structures shared by both directions

#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod inbound;
pub mod launch;
pub mod outbound;
pub mod types;

pub use error::{ProtocolError, Result};
pub use inbound::{
    ActionEvent, ActionMessage, ActionPayload, InboundMessage, PluginEvent, PluginMessage,
    TitlePayload, parse_inbound,
};
pub use launch::{
    ActionInfo, ApplicationInfo, DEFAULT_PLUGIN_ID, LaunchArgs, PluginInfo, RegistrationInfo,
    normalize_launch_args, parse_launch_args,
};
pub use outbound::{OutboundMessage, Target};
pub use types::{Coordinates, DeviceInfo, DeviceSize, Settings, TitleParameters, UserInfo};
