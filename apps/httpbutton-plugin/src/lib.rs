#![forbid(unsafe_code)]

//! HTTP Button deck plugin.
//!
//! Text keys render label lines fetched from an HTTP endpoint (or a cached
//! label file) as SVG faces and POST the key index to an action URL when
//! pressed. Image keys mirror a remote picture, fitted to the key. Both poll
//! on a per-key interval and only redraw when the content changes.

pub mod actions;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod http;
pub mod imaging;
pub mod outbox;
pub mod plugin;
pub mod registry;
pub mod sync;

pub use cache::{AssetCache, CacheError};
pub use config::{Config, ConfigError};
pub use dispatcher::{ActionHandler, Dispatcher, PluginHandler, PluginState};
pub use http::{BasicAuth, HttpClient, HttpError};
pub use outbox::{Outbox, OutboxError};
pub use plugin::Plugin;
pub use registry::{ActionInstance, ActionRegistry, SharedRegistry};
pub use sync::{ContentSync, SyncError, SyncOutcome, SyncServices};
