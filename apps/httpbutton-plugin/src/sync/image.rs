//! Image keys: a remote picture fitted onto the key face.

use std::sync::Arc;

use async_trait::async_trait;
use deck::{OutboundMessage, Settings};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ContentSync, Poller, SyncError, SyncOutcome, SyncServices};
use crate::http::BasicAuth;
use crate::imaging;
use crate::outbox::OutboxError;

pub const TIMER_PREFIX: &str = "image-url-watch";
pub const DEFAULT_IMAGE_NAME: &str = "httpImage";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub image_url: Option<String>,
    pub image_name: String,
    pub title: Option<String>,
    pub auth: Option<BasicAuth>,
}

impl ImageSettings {
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
            image_url: text("imageUrl"),
            image_name: text("imageName").unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string()),
            title: text("title"),
            auth: BasicAuth::from_parts(raw("httpUsername"), raw("httpPassword")),
        }
    }

    pub fn cache_path(&self) -> String {
        format!("last/{}.png", self.image_name)
    }
}

/// Decode `bytes` and fit them onto a key face, returning PNG bytes.
pub fn render_face(bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
    let decoded = imaging::decode(bytes).map_err(|error| SyncError::Render(error.to_string()))?;
    let face = imaging::fit_to_key(&decoded);
    imaging::encode_png(&face).map_err(|error| SyncError::Render(error.to_string()))
}

pub struct ImageSync {
    services: SyncServices,
    poller: Poller,
}

impl ImageSync {
    pub fn new(services: SyncServices) -> Arc<Self> {
        Arc::new(Self {
            services,
            poller: Poller::new("image", TIMER_PREFIX),
        })
    }

    async fn show(
        &self,
        context: &str,
        settings: &ImageSettings,
        png: &[u8],
    ) -> Result<(), SyncError> {
        self.services
            .outbox
            .set_image(context, &imaging::png_data_url(png))
            .await?;
        if let Some(title) = &settings.title {
            self.services
                .outbox
                .send(OutboundMessage::set_title(context, title.clone()))
                .await
                .map_err(OutboxError::from)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentSync for ImageSync {
    fn poller(&self) -> &Poller {
        &self.poller
    }

    fn services(&self) -> &SyncServices {
        &self.services
    }

    async fn sync_once(&self, context: &str, force: bool) -> Result<SyncOutcome, SyncError> {
        let Some(settings) = self.services.settings_of(context).await else {
            return Ok(SyncOutcome::Detached);
        };
        let settings = ImageSettings::from_settings(&settings);
        let Some(url) = settings.image_url.clone() else {
            warn!(context = %context, "no imageUrl configured");
            return Ok(SyncOutcome::Empty);
        };
        if !force && self.poller.fingerprints.get(context).await.as_deref() == Some(url.as_str()) {
            return Ok(SyncOutcome::Unchanged);
        }

        let bytes = self
            .services
            .http
            .get_bytes(&url, settings.auth.as_ref())
            .await
            .map_err(|error| SyncError::ContentFetch(format!("{url}: {error}")))?;
        let png = render_face(&bytes)?;
        let shown = self
            .services
            .while_live(context, async {
                self.show(context, &settings, &png).await?;
                self.poller.fingerprints.update(context, &url).await;
                Ok::<_, SyncError>(())
            })
            .await;
        match shown {
            Some(result) => result?,
            None => return Ok(SyncOutcome::Detached),
        }
        if let Err(error) = self
            .services
            .cache
            .write_bytes(&settings.cache_path(), &png)
            .await
        {
            warn!(context = %context, "failed to persist image face: {}", error);
        }
        info!(context = %context, url = %url, "image face updated");
        Ok(SyncOutcome::Dispatched)
    }

    /// Cached face first; only a miss goes to the network.
    async fn appear(&self, context: &str) -> Result<SyncOutcome, SyncError> {
        let Some(settings) = self.services.settings_of(context).await else {
            return Ok(SyncOutcome::Detached);
        };
        let settings = ImageSettings::from_settings(&settings);
        let cached = match self.services.cache.read_bytes(&settings.cache_path()).await {
            Ok(cached) => cached,
            Err(error) => {
                warn!(context = %context, "failed to read cached face: {}", error);
                None
            }
        };

        match cached {
            Some(png) => {
                debug!(context = %context, "showing cached {}", settings.cache_path());
                let shown = self
                    .services
                    .while_live(context, async {
                        self.show(context, &settings, &png).await?;
                        if let Some(url) = &settings.image_url {
                            self.poller.fingerprints.update(context, url).await;
                        }
                        Ok::<_, SyncError>(())
                    })
                    .await;
                match shown {
                    Some(result) => result.map(|()| SyncOutcome::Dispatched),
                    None => Ok(SyncOutcome::Detached),
                }
            }
            None => self.refresh(context, true).await,
        }
    }
}
