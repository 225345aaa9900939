//! Per-key content polling.
//!
//! Both key variants share one skeleton: a named interval per context, a
//! fingerprint of the last dispatched content, and a refresh pass that fetches,
//! compares, renders and dispatches. Ticks skip a context whose previous pass
//! is still running; forced refreshes always run.

pub mod image;
pub mod text;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deck::Settings;
use deck_client::{ClientError, TimerService};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{AssetCache, CacheError};
use crate::config::Config;
use crate::http::{HttpClient, HttpError};
use crate::outbox::{Outbox, OutboxError};
use crate::registry::{ActionInstance, SharedRegistry};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(60_000);
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("content fetch failed: {0}")]
    ContentFetch(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("persistence failed: {0}")]
    Persistence(#[from] CacheError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] OutboxError),
    #[error("button action request failed: {0}")]
    Action(#[source] HttpError),
    #[error("no action URL configured")]
    MissingActionUrl,
    #[error("timer unavailable: {0}")]
    Timer(#[from] ClientError),
}

/// Result of one refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new face went to the host.
    Dispatched,
    /// Content matched the fingerprint.
    Unchanged,
    /// Nothing to render (no source configured, or no label lines).
    Empty,
    /// A previous pass for this context is still running.
    InFlight,
    /// The instance is gone.
    Detached,
}

/// Shared dependencies of the sync engines.
#[derive(Clone)]
pub struct SyncServices {
    pub registry: SharedRegistry,
    pub outbox: Outbox,
    pub http: HttpClient,
    pub cache: AssetCache,
    pub timers: Arc<TimerService>,
    pub config: Config,
}

impl SyncServices {
    pub async fn instance(&self, context: &str) -> Option<ActionInstance> {
        self.registry.read().await.get_action(context).cloned()
    }

    pub async fn settings_of(&self, context: &str) -> Option<Settings> {
        self.registry
            .read()
            .await
            .get_action(context)
            .map(|instance| instance.settings.clone())
    }

    /// Run `work` only while `context` is registered. The registry stays
    /// read-locked until `work` finishes, so a removal waits for it.
    pub async fn while_live<F, T>(&self, context: &str, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let registry = self.registry.read().await;
        if registry.get_action(context).is_none() {
            return None;
        }
        let output = work.await;
        drop(registry);
        Some(output)
    }
}

/// Poll interval from the `updateInterval` setting.
///
/// Missing, zero or non-numeric values use the default; anything else is
/// floored at one second.
pub fn update_interval(settings: &Settings) -> Duration {
    let requested = settings.get("updateInterval").and_then(numeric_setting);
    match requested {
        Some(ms) if ms.is_finite() && ms.abs() > 0.0 => {
            Duration::from_millis(ms.max(MIN_UPDATE_INTERVAL.as_millis() as f64) as u64)
        }
        _ => DEFAULT_UPDATE_INTERVAL,
    }
}

fn numeric_setting(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) if text.trim().is_empty() => Some(0.0),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Last-seen content per context.
#[derive(Debug, Default)]
pub struct Fingerprints {
    entries: Mutex<HashMap<String, String>>,
}

impl Fingerprints {
    pub async fn get(&self, context: &str) -> Option<String> {
        self.entries.lock().await.get(context).cloned()
    }

    /// Record `fingerprint`; true when it differs from the previous one.
    pub async fn update(&self, context: &str, fingerprint: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let changed = entries.get(context).is_none_or(|previous| previous != fingerprint);
        if changed {
            entries.insert(context.to_string(), fingerprint.to_string());
        }
        changed
    }

    pub async fn clear(&self, context: &str) {
        self.entries.lock().await.remove(context);
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Per-variant polling state.
#[derive(Debug)]
pub struct Poller {
    name: &'static str,
    timer_prefix: &'static str,
    pub fingerprints: Fingerprints,
    in_flight: Mutex<HashSet<String>>,
}

impl Poller {
    pub fn new(name: &'static str, timer_prefix: &'static str) -> Self {
        Self {
            name,
            timer_prefix,
            fingerprints: Fingerprints::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn timer_id(&self, context: &str) -> String {
        format!("{}-{}", self.timer_prefix, context)
    }

    async fn begin(&self, context: &str, force: bool) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        if !force && in_flight.contains(context) {
            return false;
        }
        in_flight.insert(context.to_string());
        true
    }

    async fn finish(&self, context: &str) {
        self.in_flight.lock().await.remove(context);
    }
}

#[async_trait]
pub trait ContentSync: Send + Sync + 'static {
    fn poller(&self) -> &Poller;

    fn services(&self) -> &SyncServices;

    /// One fetch, compare, render and dispatch pass.
    async fn sync_once(&self, context: &str, force: bool) -> Result<SyncOutcome, SyncError>;

    async fn refresh(&self, context: &str, force: bool) -> Result<SyncOutcome, SyncError> {
        if !self.poller().begin(context, force).await {
            debug!(context = %context, "{} refresh already running", self.poller().name());
            return Ok(SyncOutcome::InFlight);
        }
        let result = self.sync_once(context, force).await;
        self.poller().finish(context).await;
        result
    }

    /// First render after the key appears.
    async fn appear(&self, context: &str) -> Result<SyncOutcome, SyncError> {
        self.refresh(context, true).await
    }
}

/// (Re)start the poll interval for `context` from its current settings.
/// Returns `None` when the instance is gone.
pub async fn watch<E: ContentSync>(
    engine: &Arc<E>,
    context: &str,
) -> Result<Option<Duration>, SyncError> {
    let Some(settings) = engine.services().settings_of(context).await else {
        return Ok(None);
    };
    let interval = update_interval(&settings);
    let timer_id = engine.poller().timer_id(context);
    let timers = &engine.services().timers;
    timers.cancel(&timer_id)?;

    let weak = Arc::downgrade(engine);
    let tick_context = context.to_string();
    timers.schedule(
        timer_id,
        interval,
        Arc::new(move || {
            if let Some(engine) = weak.upgrade() {
                spawn_refresh(&engine, tick_context.clone(), false);
            }
        }),
    )?;
    Ok(Some(interval))
}

/// Stop polling `context` and forget its fingerprint.
pub async fn unwatch<E: ContentSync>(engine: &E, context: &str) -> Result<(), SyncError> {
    engine
        .services()
        .timers
        .cancel(&engine.poller().timer_id(context))?;
    engine.poller().fingerprints.clear(context).await;
    Ok(())
}

/// Run a refresh in the background, logging the outcome.
pub fn spawn_refresh<E: ContentSync>(engine: &Arc<E>, context: String, force: bool) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        let result = engine.refresh(&context, force).await;
        log_outcome(engine.poller().name(), &context, result);
    });
}

/// Run the appearance render in the background.
pub fn spawn_appear<E: ContentSync>(engine: &Arc<E>, context: String) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        let result = engine.appear(&context).await;
        log_outcome(engine.poller().name(), &context, result);
    });
}

fn log_outcome(name: &str, context: &str, result: Result<SyncOutcome, SyncError>) {
    match result {
        Ok(outcome) => debug!(context = %context, ?outcome, "{} refresh finished", name),
        Err(error) => warn!(context = %context, "{} refresh failed: {}", name, error),
    }
}
