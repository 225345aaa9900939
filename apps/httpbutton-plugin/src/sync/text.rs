//! Text keys: labels fetched from a URL or a cached label file, drawn as SVG.

use std::sync::Arc;

use async_trait::async_trait;
use deck::{Coordinates, Settings};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::{ContentSync, Poller, SyncError, SyncOutcome, SyncServices};
use crate::http::BasicAuth;
use crate::imaging::{KEY_SIZE, svg_data_url};

pub const TIMER_PREFIX: &str = "md-file-watch";
pub const DEFAULT_LABEL_FILE: &str = "text.md";
/// Lines starting with this are source headers, not labels.
pub const HEADER_PREFIX: &str = "button content:";

const FONT_SIZE: i32 = 20;
const LINE_HEIGHT: i32 = 32;
const FONT_FAMILY: &str = "Arial, Segoe UI";

/// Text-key settings as read from the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSettings {
    pub label_file: String,
    pub text_url: Option<String>,
    pub auth: Option<BasicAuth>,
    pub button_index: Option<u64>,
    pub http_url: Option<String>,
    pub send_text: bool,
}

impl TextSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        let text = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let raw = |key: &str| settings.get(key).and_then(Value::as_str).unwrap_or_default();

        Self {
            label_file: text("mdFilePath").unwrap_or_else(|| DEFAULT_LABEL_FILE.to_string()),
            text_url: text("textUrl"),
            auth: BasicAuth::from_parts(raw("httpUsername"), raw("httpPassword")),
            button_index: settings.get("buttonIndex").and_then(Value::as_u64),
            http_url: text("httpUrl"),
            send_text: settings.get("sendText").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    /// Label file name without `.md`, if anything is left.
    pub fn source_name(&self) -> Option<String> {
        let name = self
            .label_file
            .strip_suffix(".md")
            .unwrap_or(&self.label_file)
            .trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn rendered_path(&self) -> String {
        let name = self.source_name().unwrap_or_else(|| "last".to_string());
        format!("images/{name}.svg")
    }
}

/// 1-based key index: explicit setting, else grid position, else 1.
pub fn button_index(
    settings: &TextSettings,
    coordinates: Option<Coordinates>,
    columns: u32,
) -> u64 {
    if let Some(index) = settings.button_index {
        return index;
    }
    coordinates.map_or(1, |coordinates| u64::from(coordinates.key_index(columns)))
}

/// Non-blank, non-header lines, trimmed.
pub fn parse_labels(text: &str) -> Vec<String> {
    text.split('\n')
        .filter(|line| !line.trim().is_empty() && !line.starts_with(HEADER_PREFIX))
        .map(|line| line.trim().to_string())
        .collect()
}

/// Baselines for `count` lines, centred vertically.
pub fn baselines(count: usize) -> Vec<i32> {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    let center = KEY_SIZE as i32 / 2;
    let first = center - (count - 1).max(0) * LINE_HEIGHT / 2 + FONT_SIZE / 2;
    (0..count).map(|line| first + line * LINE_HEIGHT).collect()
}

pub fn render_svg(labels: &[String]) -> String {
    let size = KEY_SIZE;
    let center = KEY_SIZE / 2;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
    );
    svg.push_str(&format!(
        r##"<rect width="{size}" height="{size}" rx="18" fill="#111"/>"##
    ));
    for (label, y) in labels.iter().zip(baselines(labels.len())) {
        svg.push_str(&format!(
            r##"<text x="{center}" y="{y}" text-anchor="middle" font-family="{FONT_FAMILY}" font-size="{FONT_SIZE}" fill="#fff">{}</text>"##,
            escape_xml(label)
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub struct TextSync {
    services: SyncServices,
    poller: Poller,
}

impl TextSync {
    pub fn new(services: SyncServices) -> Arc<Self> {
        Arc::new(Self {
            services,
            poller: Poller::new("text", TIMER_PREFIX),
        })
    }

    /// Remote text when configured and non-empty (written through to the
    /// label file), else the label file.
    pub async fn load_text(
        &self,
        settings: &TextSettings,
        index: u64,
    ) -> Result<String, SyncError> {
        let cache = &self.services.cache;
        if let Some(url) = &settings.text_url {
            let mut body = Map::new();
            body.insert("button".to_string(), json!(index));
            if let Some(name) = settings.source_name() {
                body.insert("name".to_string(), json!(name));
            }
            match self
                .services
                .http
                .fetch_text(url, &Value::Object(body), settings.auth.as_ref())
                .await
            {
                Ok(text) if !text.is_empty() => {
                    if let Err(error) = cache.write_text(&settings.label_file, &text).await {
                        warn!("failed to cache labels from {}: {}", url, error);
                    }
                    return Ok(text);
                }
                Ok(_) => debug!("{} returned no text, using {}", url, settings.label_file),
                Err(error) => warn!(
                    "text fetch from {} failed, using {}: {}",
                    url, settings.label_file, error
                ),
            }
        }

        match cache.read_text(&settings.label_file).await? {
            Some(text) => Ok(text),
            None => Err(SyncError::ContentFetch(format!(
                "no text available: {} is missing",
                settings.label_file
            ))),
        }
    }

    /// Key press: POST the button index to the action URL, then re-render.
    pub async fn press(
        &self,
        context: &str,
        coordinates: Option<Coordinates>,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(instance) = self.services.instance(context).await else {
            return Ok(SyncOutcome::Detached);
        };
        let settings = TextSettings::from_settings(&instance.settings);
        let index = button_index(
            &settings,
            coordinates.or(instance.coordinates),
            self.services.config.grid_columns,
        );
        let url = settings
            .http_url
            .clone()
            .or_else(|| self.services.config.default_action_url.clone())
            .ok_or(SyncError::MissingActionUrl)?;

        let mut body = Map::new();
        body.insert("button".to_string(), json!(index));
        if settings.send_text {
            match self.load_text(&settings, index).await {
                Ok(text) => {
                    let labels = parse_labels(&text);
                    let label = usize::try_from(index)
                        .ok()
                        .and_then(|index| index.checked_sub(1))
                        .and_then(|position| labels.get(position));
                    if let Some(label) = label {
                        body.insert("text".to_string(), json!(label));
                    }
                }
                Err(error) => warn!(
                    context = %context,
                    "label lookup failed, sending press without text: {}",
                    error
                ),
            }
        }

        self.services
            .http
            .post_json(&url, &Value::Object(body), settings.auth.as_ref())
            .await
            .map_err(SyncError::Action)?;
        info!(context = %context, button = index, "button action sent");

        self.poller.fingerprints.clear(context).await;
        self.refresh(context, true).await
    }
}

#[async_trait]
impl ContentSync for TextSync {
    fn poller(&self) -> &Poller {
        &self.poller
    }

    fn services(&self) -> &SyncServices {
        &self.services
    }

    async fn sync_once(&self, context: &str, force: bool) -> Result<SyncOutcome, SyncError> {
        let Some(instance) = self.services.instance(context).await else {
            return Ok(SyncOutcome::Detached);
        };
        let settings = TextSettings::from_settings(&instance.settings);
        let index = button_index(
            &settings,
            instance.coordinates,
            self.services.config.grid_columns,
        );

        let text = self.load_text(&settings, index).await?;
        if text.is_empty() {
            return Ok(SyncOutcome::Empty);
        }
        let changed =
            self.poller.fingerprints.get(context).await.as_deref() != Some(text.as_str());
        if !changed && !force {
            return Ok(SyncOutcome::Unchanged);
        }

        let labels = parse_labels(&text);
        if labels.is_empty() {
            debug!(context = %context, "no label lines in {}", settings.label_file);
            return Ok(SyncOutcome::Empty);
        }

        let svg = render_svg(&labels);
        let dispatched = self
            .services
            .while_live(context, async {
                self.services
                    .outbox
                    .set_image(context, &svg_data_url(&svg))
                    .await?;
                self.poller.fingerprints.update(context, &text).await;
                Ok::<_, SyncError>(())
            })
            .await;
        match dispatched {
            Some(result) => result?,
            None => return Ok(SyncOutcome::Detached),
        }
        if let Err(error) = self
            .services
            .cache
            .write_text(&settings.rendered_path(), &svg)
            .await
        {
            warn!(context = %context, "failed to persist rendered face: {}", error);
        }
        info!(context = %context, labels = labels.len(), "text face updated");
        Ok(SyncOutcome::Dispatched)
    }
}
