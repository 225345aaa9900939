#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use deck::{OutboundMessage, Settings};
use deck_client::{ClientError, HostSink, RecordingSink, SendOutcome, TimerService};
use httpbutton::{AssetCache, Config, HttpClient, Outbox, SyncServices, registry::ActionRegistry};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};

pub async fn spawn_http_server(app: axum::Router) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    Ok((addr, shutdown_tx))
}

/// Request bodies seen by a stub endpoint.
#[derive(Clone, Default)]
pub struct Requests(Arc<Mutex<Vec<Value>>>);

impl Requests {
    pub fn push(&self, body: Value) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(body);
    }

    pub fn all(&self) -> Vec<Value> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub fn test_config(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

pub fn services(sink: &RecordingSink, config: Config) -> Result<SyncServices> {
    services_with(Arc::new(sink.clone()), config)
}

pub fn services_with(sink: Arc<dyn HostSink>, config: Config) -> Result<SyncServices> {
    let http = HttpClient::new(config.request_timeout)?;
    Ok(SyncServices {
        registry: ActionRegistry::shared(),
        outbox: Outbox::new(sink, http.clone()),
        http,
        cache: AssetCache::new(config.data_dir.clone()),
        timers: Arc::new(TimerService::spawn()),
        config,
    })
}

pub fn settings(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

/// Decoded SVG markup of a `setImage` frame.
pub fn svg_of(message: &OutboundMessage) -> Result<String> {
    let OutboundMessage::SetImage { image, .. } = message else {
        bail!("expected setImage, got {}", message.event_name());
    };
    let Some(encoded) = image.strip_prefix("data:image/svg+xml;base64,") else {
        bail!("not an SVG data URL: {image}");
    };
    Ok(String::from_utf8(STANDARD.decode(encoded)?)?)
}

/// Poll `sink` until it holds `count` frames named `event`.
pub async fn wait_for_event(
    sink: &RecordingSink,
    event: &str,
    count: usize,
) -> Result<Vec<OutboundMessage>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let sent = sink.sent_with_event(event).await;
        if sent.len() >= count {
            return Ok(sent);
        }
        if tokio::time::Instant::now() > deadline {
            bail!("timed out waiting for {count} {event} frame(s), saw {}", sent.len());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Fails the first `failures` sends, then records like `RecordingSink`.
#[derive(Clone)]
pub struct FlakySink {
    failures: Arc<AtomicUsize>,
    pub recorded: RecordingSink,
}

impl FlakySink {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: Arc::new(AtomicUsize::new(failures)),
            recorded: RecordingSink::new(),
        }
    }
}

#[async_trait]
impl HostSink for FlakySink {
    async fn send(&self, message: OutboundMessage) -> deck_client::Result<SendOutcome> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ClientError::NotConnected);
        }
        self.recorded.send(message).await
    }
}

/// Holds every send until `release` is notified; `entered` fires as each
/// send arrives.
#[derive(Clone, Default)]
pub struct GatedSink {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    pub recorded: RecordingSink,
}

#[async_trait]
impl HostSink for GatedSink {
    async fn send(&self, message: OutboundMessage) -> deck_client::Result<SendOutcome> {
        self.entered.notify_one();
        self.release.notified().await;
        self.recorded.send(message).await
    }
}
