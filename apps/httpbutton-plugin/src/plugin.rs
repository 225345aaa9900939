//! Plugin session: wires the host connection, timers, registry and handlers
//! together and runs the event loop.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use deck::{LaunchArgs, OutboundMessage, PluginEvent, PluginMessage};
use deck_client::{HostConnection, HostEvent, TimerService};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actions::{IMAGE_ACTION, ImageButton, TEXT_ACTION, TextButton};
use crate::cache::AssetCache;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, PluginHandler, PluginState};
use crate::http::HttpClient;
use crate::outbox::Outbox;
use crate::registry::{ActionRegistry, SharedRegistry};
use crate::sync::SyncServices;
use crate::sync::image::ImageSync;
use crate::sync::text::TextSync;

pub struct Plugin {
    launch: LaunchArgs,
    config: Config,
    connection: Arc<HostConnection>,
    timers: Arc<TimerService>,
    text: Arc<TextSync>,
    image: Arc<ImageSync>,
    dispatcher: Dispatcher,
}

impl Plugin {
    pub fn new(launch: LaunchArgs, config: Config) -> anyhow::Result<Self> {
        let http = HttpClient::new(config.request_timeout).context("building HTTP client")?;
        let connection = Arc::new(HostConnection::new(&launch));
        let timers = Arc::new(TimerService::spawn());
        let registry = ActionRegistry::shared();

        let services = SyncServices {
            registry: registry.clone(),
            outbox: Outbox::new(connection.clone(), http.clone()),
            http,
            cache: AssetCache::new(config.data_dir.clone()),
            timers: timers.clone(),
            config: config.clone(),
        };
        let text = TextSync::new(services.clone());
        let image = ImageSync::new(services);

        let dispatcher = Dispatcher::new(registry)
            .with_handler(Arc::new(TextButton::new(
                launch.action_id(TEXT_ACTION),
                text.clone(),
            )))
            .with_handler(Arc::new(ImageButton::new(
                launch.action_id(IMAGE_ACTION),
                image.clone(),
            )))
            .with_plugin_handler(Arc::new(HostActivityLog));

        Ok(Self {
            launch,
            config,
            connection,
            timers,
            text,
            image,
            dispatcher,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        self.dispatcher.registry()
    }

    pub fn connection(&self) -> &Arc<HostConnection> {
        &self.connection
    }

    pub fn timers(&self) -> &Arc<TimerService> {
        &self.timers
    }

    pub fn text_sync(&self) -> &Arc<TextSync> {
        &self.text
    }

    pub fn image_sync(&self) -> &Arc<ImageSync> {
        &self.image
    }

    pub async fn plugin_state(&self) -> PluginState {
        self.dispatcher.plugin_state().await
    }

    /// Run until ctrl-c.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {}", error);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the event loop until `shutdown` resolves. A closed connection is
    /// reopened after the configured delay; the registry survives reconnects.
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut reconnect_at = match self.open().await {
            Ok(()) => None,
            Err(error) => {
                warn!("host connection failed: {:#}", error);
                Some(Instant::now() + self.config.reconnect_delay)
            }
        };

        loop {
            let deadline = reconnect_at;
            let reconnect = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = self.connection.recv() => match event {
                    Some(HostEvent::Frame(text)) => self.dispatcher.dispatch_text(&text).await,
                    Some(HostEvent::Closed) => {
                        warn!(
                            delay_ms = self.config.reconnect_delay.as_millis() as u64,
                            "host connection closed, reconnecting"
                        );
                        reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
                    }
                    None => break,
                },
                fired = self.timers.next_fired() => match fired {
                    Some(fired) => {
                        if !self.timers.dispatch(&fired) {
                            debug!(timer = %fired.id, "fire for cancelled interval");
                        }
                    }
                    None => break,
                },
                () = reconnect => {
                    reconnect_at = match self.open().await {
                        Ok(()) => None,
                        Err(error) => {
                            warn!("reconnect failed: {:#}", error);
                            Some(Instant::now() + self.config.reconnect_delay)
                        }
                    };
                }
            }
        }

        self.close().await
    }

    async fn open(&self) -> anyhow::Result<()> {
        self.connection
            .connect()
            .await
            .with_context(|| format!("connecting to {}", self.connection.endpoint()))?;
        info!(
            endpoint = %self.connection.endpoint(),
            plugin = %self.launch.plugin_id(),
            "registered with host"
        );
        self.connection
            .send(OutboundMessage::GetGlobalSettings {
                context: self.launch.plugin_uuid.clone(),
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.timers.cancel_all()?;
        self.timers.shutdown();
        self.connection.disconnect().await?;
        Ok(())
    }
}

/// Logs host and device activity.
struct HostActivityLog;

#[async_trait]
impl PluginHandler for HostActivityLog {
    async fn on_plugin_event(
        &self,
        message: &PluginMessage,
        state: &PluginState,
    ) -> anyhow::Result<()> {
        match &message.event {
            PluginEvent::DeviceDidConnect { device, .. } => {
                info!(device = %device, devices = state.devices.len(), "device connected");
            }
            PluginEvent::DeviceDidDisconnect { device } => {
                info!(device = %device, devices = state.devices.len(), "device disconnected");
            }
            PluginEvent::ApplicationDidLaunch { application }
            | PluginEvent::ApplicationDidTerminate { application } => {
                debug!(application = %application, event = message.event.name(), "application event");
            }
            PluginEvent::SystemDidWakeUp => info!("system woke up"),
            _ => {}
        }
        Ok(())
    }
}
