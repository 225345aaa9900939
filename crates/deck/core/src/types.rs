//! Payload structures shared by inbound and outbound frames.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Per-action settings as stored by the host. Always a JSON object.
pub type Settings = Map<String, Value>;

/// Key position on the device grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub row: u32,
}

impl Coordinates {
    /// 1-based key index for a grid that is `columns` keys wide. Saturates
    /// at `u32::MAX` for out-of-range positions.
    #[must_use]
    pub fn key_index(&self, columns: u32) -> u32 {
        self.row
            .saturating_mul(columns)
            .saturating_add(self.column)
            .saturating_add(1)
    }
}

/// Title styling as configured by the user in the host UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleParameters {
    pub font_family: String,
    pub font_size: u32,
    pub font_style: String,
    pub font_underline: bool,
    pub show_title: bool,
    pub title_alignment: String,
    pub title_color: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSize {
    #[serde(default)]
    pub columns: u32,
    #[serde(default)]
    pub rows: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u32,
    pub size: DeviceSize,
}

/// Account details pushed by StreamDock hosts via `sendUserInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub login_name: String,
    #[serde(rename = "loginID")]
    pub login_id: String,
    pub login_image_url: String,
}

/// Accepts a JSON object, or `null` / missing as an empty object.
pub(crate) fn settings_or_empty<'de, D>(deserializer: D) -> Result<Settings, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Settings>::deserialize(deserializer)?.unwrap_or_default())
}
