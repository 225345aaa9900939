//! Host transport and timing for deck plugins.
//!
//! - `HostConnection`: the single WebSocket to the host device manager, with
//!   registration, inbound frame forwarding and buffering of images issued
//!   before the socket is open
//! - `TimerService`: named interval subscriptions driven by a dedicated thread
//! - `HostSink`: the send seam upper layers depend on

pub mod connection;
pub mod error;
pub mod sink;
pub mod timer;

pub use connection::{
    ConnectionConfig, ConnectionState, HostConnection, HostEvent, PendingImage, SendOutcome,
};
pub use error::{ClientError, Result};
pub use sink::{HostSink, RecordingSink};
pub use timer::{TimerCallback, TimerFired, TimerService};
