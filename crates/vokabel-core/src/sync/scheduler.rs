//! Debounced sync trigger
//!
//! A spawned task owns the debounce window. `schedule()` (re)starts the
//! window, `sync_now()` runs a cycle immediately, `cancel()` drops a pending
//! window. Cycles run inside the task one at a time, so triggers that arrive
//! while a cycle is in flight are coalesced into the next window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::client::{SyncClient, SyncReport};
use super::transport::{SyncError, SyncTransport};
use crate::store::KeyValueStore;

/// Default quiet period before a scheduled cycle fires
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1200);

/// Result of a cycle run by the scheduler
#[derive(Debug)]
pub enum SyncEvent {
    Completed(SyncReport),
    Failed(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Schedule,
    Now,
    Cancel,
    Shutdown,
}

pub struct SyncScheduler {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the scheduler task for `client`. Cycle outcomes are delivered on
    /// the returned receiver; dropping it is fine.
    pub fn spawn<K, T>(
        client: Arc<SyncClient<K, T>>,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>)
    where
        K: KeyValueStore + Send + 'static,
        T: SyncTransport + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(client, debounce, receiver, events));
        (Self { commands, task }, event_receiver)
    }

    /// Request a cycle after the debounce window; resets a pending window.
    pub fn schedule(&self) {
        self.send(Command::Schedule);
    }

    /// Run a cycle right away (startup trigger).
    pub fn sync_now(&self) {
        self.send(Command::Now);
    }

    /// Drop a pending debounced cycle.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    /// Stop the task, running a still-pending debounced cycle first.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(error) = self.task.await {
            tracing::warn!(error = %error, "Sync scheduler task ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!(?command, "Sync scheduler already stopped");
        }
    }
}

async fn run<K, T>(
    client: Arc<SyncClient<K, T>>,
    debounce: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SyncEvent>,
) where
    K: KeyValueStore + Send + 'static,
    T: SyncTransport + 'static,
{
    let mut deadline: Option<Instant> = None;
    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    command = commands.recv() => command,
                    () = tokio::time::sleep_until(at) => {
                        deadline = reschedule(&client, &events, debounce).await;
                        continue;
                    }
                }
            }
            None => commands.recv().await,
        };

        match command {
            Some(Command::Schedule) => deadline = Some(Instant::now() + debounce),
            Some(Command::Now) => deadline = reschedule(&client, &events, debounce).await,
            Some(Command::Cancel) => deadline = None,
            Some(Command::Shutdown) | None => {
                if deadline.is_some() {
                    run_cycle(&client, &events).await;
                }
                break;
            }
        }
    }
    tracing::debug!("Sync scheduler stopped");
}

/// Run a cycle; a cycle started elsewhere pushes this one into a new window.
async fn reschedule<K, T>(
    client: &SyncClient<K, T>,
    events: &mpsc::UnboundedSender<SyncEvent>,
    debounce: Duration,
) -> Option<Instant>
where
    K: KeyValueStore + Send,
    T: SyncTransport,
{
    if run_cycle(client, events).await {
        None
    } else {
        Some(Instant::now() + debounce)
    }
}

/// Returns `false` when the cycle could not start because another was in flight.
async fn run_cycle<K, T>(client: &SyncClient<K, T>, events: &mpsc::UnboundedSender<SyncEvent>) -> bool
where
    K: KeyValueStore + Send,
    T: SyncTransport,
{
    let event = match client.sync().await {
        Ok(report) => SyncEvent::Completed(report),
        Err(SyncError::InFlight) => {
            tracing::debug!("Sync cycle already in flight; retrying after the next window");
            return false;
        }
        Err(error) => SyncEvent::Failed(error),
    };
    // A dropped receiver only means nobody is listening.
    let _ = events.send(event);
    true
}
