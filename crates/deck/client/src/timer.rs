//! Named, cancelable interval timers.
//!
//! Intervals run on a dedicated scheduler thread so that timing stays steady
//! while the main loop is busy. Fires come back as [`TimerFired`] messages on a
//! tokio channel; the main loop passes each one to [`TimerService::dispatch`],
//! which invokes the subscribed callback for that id only.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc as async_mpsc};
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

const MIN_DELAY: Duration = Duration::from_millis(1);
const IDLE_WAIT: Duration = Duration::from_secs(3600);

pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// One interval expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub id: String,
}

enum TimerCommand {
    Schedule { id: String, delay: Duration },
    Cancel { id: String },
    Shutdown,
}

struct Interval {
    delay: Duration,
    next_due: Instant,
}

pub struct TimerService {
    command_tx: Sender<TimerCommand>,
    subscriptions: StdMutex<HashMap<String, TimerCallback>>,
    fired_rx: Mutex<async_mpsc::UnboundedReceiver<TimerFired>>,
}

impl TimerService {
    /// Start the scheduler thread.
    pub fn spawn() -> Self {
        let (command_tx, command_rx) = mpsc::channel::<TimerCommand>();
        let (fired_tx, fired_rx) = async_mpsc::unbounded_channel::<TimerFired>();
        std::thread::spawn(move || run_scheduler(command_rx, fired_tx));
        Self {
            command_tx,
            subscriptions: StdMutex::new(HashMap::new()),
            fired_rx: Mutex::new(fired_rx),
        }
    }

    /// Start (or restart) the interval `id`.
    ///
    /// An id that is already subscribed keeps its first callback; the
    /// interval itself is replaced with the new delay.
    pub fn schedule(
        &self,
        id: impl Into<String>,
        delay: Duration,
        callback: TimerCallback,
    ) -> Result<()> {
        let id = id.into();
        self.lock_subscriptions().entry(id.clone()).or_insert(callback);
        let delay = delay.max(MIN_DELAY);
        debug!(timer = %id, delay_ms = delay.as_millis() as u64, "interval scheduled");
        self.command_tx
            .send(TimerCommand::Schedule { id, delay })
            .map_err(|_| ClientError::TimerStopped)
    }

    /// Stop the interval `id`. Unknown ids are a no-op.
    pub fn cancel(&self, id: &str) -> Result<()> {
        if self.lock_subscriptions().remove(id).is_some() {
            debug!(timer = %id, "interval cancelled");
        }
        self.command_tx
            .send(TimerCommand::Cancel { id: id.to_string() })
            .map_err(|_| ClientError::TimerStopped)
    }

    /// Cancel every interval.
    pub fn cancel_all(&self) -> Result<()> {
        let ids: Vec<String> = self.lock_subscriptions().keys().cloned().collect();
        for id in ids {
            self.cancel(&id)?;
        }
        Ok(())
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.lock_subscriptions().contains_key(id)
    }

    pub fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_subscriptions().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Next fire from the scheduler thread. `None` after shutdown.
    pub async fn next_fired(&self) -> Option<TimerFired> {
        self.fired_rx.lock().await.recv().await
    }

    /// Invoke the callback subscribed to `fired.id`. Returns false for fires
    /// that arrive after their interval was cancelled.
    pub fn dispatch(&self, fired: &TimerFired) -> bool {
        let callback = self.lock_subscriptions().get(&fired.id).cloned();
        match callback {
            Some(callback) => {
                trace!(timer = %fired.id, "interval fired");
                callback();
                true
            }
            None => false,
        }
    }

    /// Stop the scheduler thread.
    pub fn shutdown(&self) {
        self.lock_subscriptions().clear();
        let _ = self.command_tx.send(TimerCommand::Shutdown);
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<String, TimerCallback>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let _ = self.command_tx.send(TimerCommand::Shutdown);
    }
}

fn run_scheduler(
    command_rx: Receiver<TimerCommand>,
    fired_tx: async_mpsc::UnboundedSender<TimerFired>,
) {
    let mut intervals: HashMap<String, Interval> = HashMap::new();

    loop {
        let now = Instant::now();
        let wait = intervals
            .values()
            .map(|interval| interval.next_due.saturating_duration_since(now))
            .min()
            .unwrap_or(IDLE_WAIT);

        match command_rx.recv_timeout(wait) {
            Ok(TimerCommand::Schedule { id, delay }) => {
                intervals.insert(
                    id,
                    Interval {
                        delay,
                        next_due: Instant::now() + delay,
                    },
                );
            }
            Ok(TimerCommand::Cancel { id }) => {
                intervals.remove(&id);
            }
            Ok(TimerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        for (id, interval) in &mut intervals {
            if interval.next_due <= now {
                // Re-arm from the fire instant, never from the missed deadline.
                interval.next_due = now + interval.delay;
                if fired_tx.send(TimerFired { id: id.clone() }).is_err() {
                    return;
                }
            }
        }
    }
}
