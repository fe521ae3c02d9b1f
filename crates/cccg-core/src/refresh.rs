//! Cache refresher
//!
//! Re-runs [`SaveCoordinator::cache_cloud_saves`] whenever the app comes
//! back to the foreground or a background worker posts `cacheCloudSaves`.
//! Triggers that pile up while a refresh is running collapse into one.

use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cloud::CloudStore;
use crate::coordinator::SaveCoordinator;
use crate::error::PersistError;

/// Message a background worker posts to ask for a refresh
pub const WORKER_CACHE_MESSAGE: &str = "cacheCloudSaves";

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTrigger {
    /// The app became visible again
    Foreground,
    /// A background worker asked for it
    WorkerMessage,
}

impl FromStr for CacheTrigger {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            WORKER_CACHE_MESSAGE => Ok(CacheTrigger::WorkerMessage),
            "foreground" => Ok(CacheTrigger::Foreground),
            other => Err(PersistError::InvalidOperation(format!(
                "unknown cache trigger '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CacheTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTrigger::Foreground => write!(f, "foreground"),
            CacheTrigger::WorkerMessage => write!(f, "{}", WORKER_CACHE_MESSAGE),
        }
    }
}

/// Handle to the background refresh task
pub struct CacheRefresher {
    trigger_tx: mpsc::UnboundedSender<CacheTrigger>,
    task: JoinHandle<()>,
}

impl CacheRefresher {
    /// Spawn the refresher. Must be called inside a tokio runtime.
    pub fn spawn<C>(coordinator: SaveCoordinator<C>) -> Self
    where
        C: CloudStore + 'static,
    {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::refresh_task(coordinator, trigger_rx));
        Self { trigger_tx, task }
    }

    /// Request a refresh; returns immediately.
    pub fn trigger(&self, trigger: CacheTrigger) {
        if self.trigger_tx.send(trigger).is_err() {
            warn!(%trigger, "Cache refresher is stopped");
        }
    }

    /// Parse a posted message and trigger on it. Unknown messages are
    /// ignored and reported as `false`.
    pub fn handle_message(&self, message: &str) -> bool {
        match message.parse::<CacheTrigger>() {
            Ok(trigger) => {
                self.trigger(trigger);
                true
            }
            Err(_) => {
                debug!(message, "Ignoring unrelated message");
                false
            }
        }
    }

    /// Stop the task after any in-flight refresh
    pub async fn shutdown(self) {
        drop(self.trigger_tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Cache refresh task ended abnormally");
        }
    }

    async fn refresh_task<C: CloudStore + 'static>(
        coordinator: SaveCoordinator<C>,
        mut trigger_rx: mpsc::UnboundedReceiver<CacheTrigger>,
    ) {
        while let Some(trigger) = trigger_rx.recv().await {
            let mut coalesced = 0usize;
            while trigger_rx.try_recv().is_ok() {
                coalesced += 1;
            }
            debug!(%trigger, coalesced, "Refreshing cloud cache");

            match coordinator.cache_cloud_saves().await {
                Ok(report) => info!(%trigger, %report, "Cloud cache refreshed"),
                Err(e) => warn!(%trigger, error = %e, "Cloud cache refresh failed"),
            }
        }
        debug!("Cache refresh task ended");
    }
}
