//! Action handlers for the two key types.

mod image_button;
mod text_button;

pub use image_button::ImageButton;
pub use text_button::TextButton;

/// Action name suffix of the text key.
pub const TEXT_ACTION: &str = "httpButton";
/// Action name suffix of the image key.
pub const IMAGE_ACTION: &str = "imageButton";

fn requested_command(payload: &serde_json::Value) -> Option<&str> {
    payload.get("action").and_then(serde_json::Value::as_str)
}
