//! Autosave scheduler
//!
//! Captures the live editing record on a debounced change signal and on a
//! fixed interval, and pushes it through [`SaveCoordinator::save_autosave`]
//! from a background task so callers never wait on the network.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  AutosaveScheduler                                              │
//! │  ├── command_tx: mpsc::UnboundedSender<AutosaveCommand>         │
//! │  │   └── mark_dirty / mark_synced / flush / end_session         │
//! │  └── task: JoinHandle                                           │
//! │      └── select! over commands, debounce deadline, interval     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A snapshot belongs to the character that was active when it was marked
//! dirty and is only ever saved under that key; a snapshot taken with nobody
//! active is dropped. A snapshot whose JSON equals the last synced JSON is
//! not dirty. A failed save leaves the snapshot dirty for the next trigger.
//! Saves run one at a time; changes that arrive meanwhile are queued and
//! compared against the newly synced baseline.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::PersistenceAdapter;
use crate::cloud::CloudStore;
use crate::coordinator::SaveCoordinator;
use crate::error::PersistResult;
use crate::events::VaultEvent;
use crate::storage::LocalStore;
use crate::types::{now_ms, Record, SaveKey};

/// Local key of the autosave slot
pub const AUTOSAVE_KEY: &str = "autosave";

/// Default quiet period after a change before saving
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Default period of the unconditional autosave tick
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

/// Longest accepted debounce or interval
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub debounce: Duration,
    pub interval: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Contents of the local `autosave` slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveSlot {
    /// Whose snapshot this is
    pub owner: SaveKey,
    pub saved_at: i64,
    pub record: Record,
}

impl AutosaveSlot {
    /// Read the slot; a missing or unreadable slot is `None`.
    pub fn read(store: &dyn LocalStore) -> Option<Self> {
        let raw = match store.get_item(AUTOSAVE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read autosave slot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(slot) => Some(slot),
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable autosave slot");
                None
            }
        }
    }

    fn write(store: &dyn LocalStore, owner: &SaveKey, record: &Record) -> PersistResult<()> {
        let slot = AutosaveSlot {
            owner: owner.clone(),
            saved_at: now_ms(),
            record: record.clone(),
        };
        store.set_item(AUTOSAVE_KEY, &serde_json::to_string(&slot)?)
    }
}

/// Record to start editing `key` from.
///
/// The local save if there is one; otherwise the autosave slot, but only
/// when it belongs to `key`. Anything else starts blank, so a snapshot from a
/// different or unknown session is never resurrected.
pub fn initial_record<C: CloudStore>(adapter: &PersistenceAdapter<C>, key: &SaveKey) -> Record {
    if let Ok(record) = adapter.load_local(key) {
        return record;
    }
    match AutosaveSlot::read(adapter.local()) {
        Some(slot) if &slot.owner == key => {
            info!(%key, saved_at = slot.saved_at, "Recovered autosave snapshot");
            slot.record
        }
        Some(slot) => {
            debug!(%key, owner = %slot.owner, "Ignoring autosave owned by another character");
            Record::new()
        }
        None => Record::new(),
    }
}

/// Supplies the key of the character currently being edited
pub type ActiveKeySource = Arc<dyn Fn() -> Option<SaveKey> + Send + Sync>;

enum AutosaveCommand {
    Dirty(Option<SaveKey>, Record),
    Synced(Record),
    Flush(oneshot::Sender<bool>),
    EndSession(oneshot::Sender<bool>),
}

/// Snapshot waiting to be saved
#[derive(Clone)]
struct PendingSnapshot {
    owner: SaveKey,
    record: Record,
    json: String,
}

/// Handle to the background autosave task
pub struct AutosaveScheduler {
    command_tx: mpsc::UnboundedSender<AutosaveCommand>,
    active_key: ActiveKeySource,
    task: JoinHandle<()>,
}

impl AutosaveScheduler {
    /// Spawn the scheduler task. Must be called inside a tokio runtime.
    pub fn spawn<C>(
        coordinator: SaveCoordinator<C>,
        active_key: ActiveKeySource,
        config: AutosaveConfig,
    ) -> Self
    where
        C: CloudStore + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let worker = AutosaveWorker {
            coordinator,
            config,
            pending: None,
            last_synced: None,
            deadline: None,
        };
        let task = tokio::spawn(worker.run(command_rx));
        info!(?config, "Autosave scheduler started");
        Self {
            command_tx,
            active_key,
            task,
        }
    }

    /// Record a new snapshot of the editing session, owned by the character
    /// active right now.
    pub fn mark_dirty(&self, record: Record) {
        let owner = (self.active_key)();
        if self.command_tx.send(AutosaveCommand::Dirty(owner, record)).is_err() {
            warn!("Autosave scheduler is stopped; change not scheduled");
        }
    }

    /// Adopt `record` as the synced baseline (after a manual save or load).
    pub fn mark_synced(&self, record: Record) {
        let _ = self.command_tx.send(AutosaveCommand::Synced(record));
    }

    /// Save any pending snapshot now; `true` when clean afterwards.
    pub async fn flush(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(AutosaveCommand::Flush(reply_tx)).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Close out the current session before another one starts.
    ///
    /// Saves any pending snapshot under its owner, then forgets it along
    /// with the synced baseline. `true` when nothing was lost; a snapshot
    /// that could not be saved is still in the local autosave slot.
    pub async fn end_session(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(AutosaveCommand::EndSession(reply_tx)).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Stop the task. Pending changes are dropped; flush first to keep them.
    pub async fn shutdown(self) {
        info!("Shutting down autosave scheduler");
        drop(self.command_tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Autosave task ended abnormally");
        }
    }
}

struct AutosaveWorker<C> {
    coordinator: SaveCoordinator<C>,
    config: AutosaveConfig,
    pending: Option<PendingSnapshot>,
    /// JSON of the last snapshot known to be saved
    last_synced: Option<String>,
    deadline: Option<Instant>,
}

impl<C: CloudStore + 'static> AutosaveWorker<C> {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<AutosaveCommand>) {
        let interval = self.config.interval.clamp(Duration::from_millis(1), MAX_PERIOD);
        let start = after(interval);
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(AutosaveCommand::Dirty(owner, record)) => self.on_dirty(owner, record).await,
                        Some(AutosaveCommand::Synced(record)) => self.on_synced(record),
                        Some(AutosaveCommand::Flush(reply)) => {
                            if self.pending.is_some() {
                                self.save_pending().await;
                            }
                            let _ = reply.send(self.pending.is_none());
                        }
                        Some(AutosaveCommand::EndSession(reply)) => {
                            let _ = reply.send(self.end_session().await);
                        }
                        None => break,
                    }
                }
                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    self.save_pending().await;
                }
                _ = ticker.tick() => {
                    if self.pending.is_some() {
                        debug!("Interval autosave");
                        self.save_pending().await;
                    }
                }
            }
        }

        debug!("Autosave task ended");
    }

    async fn on_dirty(&mut self, owner: Option<SaveKey>, record: Record) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Cannot serialize autosave snapshot");
                return;
            }
        };

        let Some(owner) = owner else {
            debug!("No active character; autosave snapshot dropped");
            self.coordinator.emit(VaultEvent::AutosaveFailed {
                key: None,
                message: "no active character".to_string(),
            });
            return;
        };

        // Another character's snapshot goes out under its own key first
        if matches!(&self.pending, Some(pending) if pending.owner != owner) {
            self.save_pending().await;
        }

        if self.last_synced.as_deref() == Some(json.as_str()) {
            self.pending = None;
            self.deadline = None;
            return;
        }

        if let Err(e) = AutosaveSlot::write(self.coordinator.adapter().local(), &owner, &record) {
            warn!(key = %owner, error = %e, "Failed to write autosave slot");
        }

        self.pending = Some(PendingSnapshot { owner, record, json });
        self.deadline = Some(after(self.config.debounce.min(MAX_PERIOD)));
    }

    fn on_synced(&mut self, record: Record) {
        let Ok(json) = record.to_json() else {
            return;
        };
        if matches!(&self.pending, Some(pending) if pending.json == json) {
            self.pending = None;
            self.deadline = None;
        }
        self.last_synced = Some(json);
    }

    async fn save_pending(&mut self) {
        self.deadline = None;
        let Some(PendingSnapshot { owner: key, record, json }) = self.pending.clone() else {
            return;
        };

        match self.coordinator.save_autosave(&key, &record).await {
            Ok(report) => {
                debug!(%key, local = report.local, cloud = report.cloud, "Autosaved");
                self.last_synced = Some(json);
                self.pending = None;
                self.coordinator.emit(VaultEvent::AutosaveCompleted { key });
            }
            Err(e) => {
                warn!(%key, error = %e, "Autosave failed; will retry");
                self.coordinator.emit(VaultEvent::AutosaveFailed {
                    key: Some(key),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn end_session(&mut self) -> bool {
        if self.pending.is_some() {
            self.save_pending().await;
        }
        let clean = self.pending.is_none();
        if let Some(pending) = self.pending.take() {
            warn!(key = %pending.owner, "Session ended with an unsaved autosave");
        }
        self.deadline = None;
        self.last_synced = None;
        clean
    }
}

/// `now + period`, saturating far in the future instead of overflowing
fn after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or(now + MAX_PERIOD)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}
