//! Host-supplied startup arguments.
//!
//! The host launches a plugin as
//! `plugin -port 28196 -pluginUUID <id> -registerEvent registerPlugin -info '<json>'`.
//! Single-dash long flags are not something clap accepts, so they are rewritten
//! to the double-dash form before parsing.

use std::ffi::OsString;

use clap::Parser;
use serde::Deserialize;

use crate::inbound::ActionPayload;
use crate::types::DeviceInfo;

/// Plugin identity used when the host does not supply one (development runs).
pub const DEFAULT_PLUGIN_ID: &str = "pro.popstas.httpbutton";

#[derive(Debug, Clone, Parser)]
#[command(name = "httpbutton-plugin", about = "HTTP Button plugin for StreamDock hosts")]
pub struct LaunchArgs {
    /// Local WebSocket port of the host device manager.
    #[arg(long)]
    pub port: u16,

    /// Registration id for this plugin process.
    #[arg(long = "pluginUUID")]
    pub plugin_uuid: String,

    /// Event name of the registration handshake.
    #[arg(long = "registerEvent", default_value = "registerPlugin")]
    pub register_event: String,

    /// Host and plugin description (JSON).
    #[arg(long, value_parser = parse_registration_info, default_value = "{}")]
    pub info: RegistrationInfo,

    /// Action the host opened this process for (JSON), property inspector launches only.
    #[arg(long = "actionInfo", value_parser = parse_action_info)]
    pub action_info: Option<ActionInfo>,
}

impl LaunchArgs {
    /// WebSocket endpoint of the host.
    pub fn endpoint(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Plugin identity, the prefix of every action type id.
    pub fn plugin_id(&self) -> &str {
        if self.info.plugin.uuid.is_empty() {
            DEFAULT_PLUGIN_ID
        } else {
            &self.info.plugin.uuid
        }
    }

    /// Fully-qualified action type id for an action declared in the manifest.
    pub fn action_id(&self, name: &str) -> String {
        format!("{}.{}", self.plugin_id(), name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrationInfo {
    pub application: ApplicationInfo,
    pub plugin: PluginInfo,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInfo {
    pub font: String,
    pub language: String,
    pub platform: String,
    pub platform_version: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub uuid: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionInfo {
    pub action: String,
    pub context: String,
    #[serde(default)]
    pub payload: ActionPayload,
}

fn parse_registration_info(raw: &str) -> Result<RegistrationInfo, String> {
    serde_json::from_str(raw).map_err(|error| format!("invalid -info JSON: {error}"))
}

fn parse_action_info(raw: &str) -> Result<ActionInfo, String> {
    serde_json::from_str(raw).map_err(|error| format!("invalid -actionInfo JSON: {error}"))
}

/// Rewrite `-flag` tokens to `--flag`, leaving values and short flags untouched.
pub fn normalize_launch_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some(text) if is_single_dash_long_flag(text) => OsString::from(format!("-{text}")),
            _ => arg,
        })
        .collect()
}

fn is_single_dash_long_flag(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some('-')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && text.len() > 2
}

/// Parse launch arguments in either the host's single-dash or the usual double-dash form.
pub fn parse_launch_args<I, T>(args: I) -> Result<LaunchArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    LaunchArgs::try_parse_from(normalize_launch_args(args))
}
