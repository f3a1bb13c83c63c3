//! Sync engine: owns outbound and inbound sync and coordinates them around
//! connectivity and a periodic timer.
//!
//! User actions are queue-and-try: the event lands in the durable queue
//! first, then a non-blocking upload is attempted when online. A failed
//! trigger is logged and tolerated — the event stays queued for the next
//! pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use retain_core::{EventId, LibraryId, UserId};
use retain_events::{schema, EventEnvelope};
use retain_store::DocumentStore;

use crate::config::SyncConfig;
use crate::cursor_store::{SyncCursor, SyncCursorStore};
use crate::inbound::{InboundReport, InboundSync};
use crate::outbound::{OutboundReport, OutboundSync};
use crate::queue::EventQueue;
use crate::sink::EventSink;
use crate::SyncError;

/// Combined result of a full sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAllReport {
    pub outbound: OutboundReport,
    pub inbound: InboundReport,
}

/// Snapshot of the engine's state for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub online: bool,
    pub auto_sync_running: bool,
    /// Events waiting in the local queue.
    pub pending_events: usize,
    /// Queue entries that exhausted their retries; kept for inspection.
    pub stalled_events: usize,
    pub cursor: Option<SyncCursor>,
    pub last_outbound: Option<OutboundReport>,
    pub last_inbound_events: Option<usize>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

struct AutoSyncTask {
    shutdown: Arc<tokio::sync::Notify>,
    join: tokio::task::JoinHandle<()>,
}

/// Coordinates the queue, the uploader and the cursor-driven feed.
pub struct SyncEngine {
    user_id: UserId,
    library_id: LibraryId,
    queue: Arc<dyn EventQueue>,
    cursors: Arc<dyn SyncCursorStore>,
    outbound: OutboundSync,
    inbound: InboundSync,
    config: SyncConfig,
    online_tx: tokio::sync::watch::Sender<bool>,
    last_outbound: Mutex<Option<OutboundReport>>,
    last_inbound_events: Mutex<Option<usize>>,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
    auto_sync: tokio::sync::Mutex<Option<AutoSyncTask>>,
    destroyed: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        user_id: UserId,
        library_id: LibraryId,
        queue: Arc<dyn EventQueue>,
        cursors: Arc<dyn SyncCursorStore>,
        store: Arc<dyn DocumentStore>,
        sink: Arc<dyn EventSink>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let outbound = OutboundSync::new(queue.clone(), sink, config.outbound.clone());
        let inbound = InboundSync::new(store, cursors.clone(), config.inbound.clone());
        let (online_tx, _) = tokio::sync::watch::channel(true);

        Arc::new(Self {
            user_id,
            library_id,
            queue,
            cursors,
            outbound,
            inbound,
            config,
            online_tx,
            last_outbound: Mutex::new(None),
            last_inbound_events: Mutex::new(None),
            last_synced_at: Mutex::new(None),
            auto_sync: tokio::sync::Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn library_id(&self) -> &LibraryId {
        &self.library_id
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Report a connectivity transition. Going online kicks off an immediate
    /// non-blocking upload of whatever queued up while offline.
    pub fn set_online(self: &Arc<Self>, online: bool) {
        let was_online = *self.online_tx.borrow();
        self.online_tx.send_replace(online);

        if online && !was_online {
            tracing::info!("connectivity restored; scheduling outbound sync");
            self.spawn_outbound();
        } else if !online && was_online {
            tracing::info!("connectivity lost; suspending sync");
        }
    }

    /// Validate and queue one event, then try a non-blocking upload when
    /// online. The event is durable once this returns.
    pub async fn queue_event(self: &Arc<Self>, raw: &JsonValue) -> Result<EventId, SyncError> {
        let (envelope, _) = schema::validate(raw)?;
        self.enqueue_validated(envelope).await
    }

    /// Queue an envelope already validated by an action helper.
    pub(crate) async fn enqueue_validated(
        self: &Arc<Self>,
        envelope: EventEnvelope,
    ) -> Result<EventId, SyncError> {
        let event_id = envelope.event_id.clone();
        self.queue.enqueue(envelope).await?;

        if self.is_online() {
            self.spawn_outbound();
        }

        Ok(event_id)
    }

    fn spawn_outbound(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.sync_outbound().await {
                // Tolerated: the events stay queued for the next pass.
                tracing::warn!(error = %err, "background outbound sync failed");
            }
        });
    }

    /// Upload pending events. Fails fast when offline.
    pub async fn sync_outbound(&self) -> Result<OutboundReport, SyncError> {
        self.require_online()?;
        let report = self.outbound.sync().await?;

        *lock(&self.last_outbound) = Some(report.clone());
        *lock(&self.last_synced_at) = Some(Utc::now());
        Ok(report)
    }

    /// Pull new events after the cursor. Fails fast when offline.
    pub async fn sync_inbound(&self) -> Result<InboundReport, SyncError> {
        self.require_online()?;
        let report = self.inbound.sync(&self.user_id, &self.library_id).await?;

        *lock(&self.last_inbound_events) = Some(report.events_received);
        *lock(&self.last_synced_at) = Some(Utc::now());
        Ok(report)
    }

    /// Run outbound and inbound concurrently; returns once both finish.
    pub async fn sync_all(&self) -> Result<SyncAllReport, SyncError> {
        self.require_online()?;

        let (outbound, inbound) = tokio::join!(
            self.outbound.sync(),
            self.inbound.sync(&self.user_id, &self.library_id),
        );
        let outbound = outbound?;
        let inbound = inbound?;

        *lock(&self.last_outbound) = Some(outbound.clone());
        *lock(&self.last_inbound_events) = Some(inbound.events_received);
        *lock(&self.last_synced_at) = Some(Utc::now());

        Ok(SyncAllReport { outbound, inbound })
    }

    /// Clear the cursor and pull the library from the beginning.
    pub async fn force_full_inbound_sync(&self) -> Result<InboundReport, SyncError> {
        self.inbound.force_full_resync(&self.library_id).await?;
        self.sync_inbound().await
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let pending = self.queue.get_pending().await?;
        let stalled = pending
            .iter()
            .filter(|e| e.attempts >= self.config.outbound.max_retries)
            .count();
        let cursor = self.cursors.get(&self.library_id).await?;

        Ok(SyncStatus {
            online: self.is_online(),
            auto_sync_running: self.auto_sync.lock().await.is_some(),
            pending_events: pending.len(),
            stalled_events: stalled,
            cursor,
            last_outbound: lock(&self.last_outbound).clone(),
            last_inbound_events: *lock(&self.last_inbound_events),
            last_synced_at: *lock(&self.last_synced_at),
        })
    }

    /// Start the periodic sync task. Idempotent; a no-op after `destroy`.
    pub async fn start_auto_sync(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = self.auto_sync.lock().await;
        if slot.is_some() {
            return;
        }

        let shutdown = Arc::new(tokio::sync::Notify::new());
        let engine = self.clone();
        let task_shutdown = shutdown.clone();
        let interval_ms = self.config.engine.auto_sync_interval_ms.max(1);
        let mut online_rx = self.online_tx.subscribe();

        let join = tokio::spawn(async move {
            tracing::info!(interval_ms, "auto sync started");
            let mut ticker =
                tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the cadence is
            // one full interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => {
                        tracing::info!("auto sync stopped");
                        break;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow() {
                            if let Err(err) = engine.sync_all().await {
                                tracing::warn!(error = %err, "sync after reconnect failed");
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if !engine.is_online() {
                            tracing::debug!("skipping periodic sync while offline");
                            continue;
                        }
                        if let Err(err) = engine.sync_all().await {
                            tracing::warn!(error = %err, "periodic sync failed");
                        }
                    }
                }
            }
        });

        *slot = Some(AutoSyncTask { shutdown, join });
    }

    /// Stop the periodic sync task. Idempotent.
    pub async fn stop_auto_sync(&self) {
        let task = self.auto_sync.lock().await.take();
        if let Some(task) = task {
            task.shutdown.notify_one();
            if let Err(err) = task.join.await {
                tracing::warn!(error = %err, "auto sync task join failed");
            }
        }
    }

    /// Tear down: stops the timer and refuses later `start_auto_sync` calls.
    /// Idempotent; queued events stay durable.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.stop_auto_sync().await;
    }

    fn require_online(&self) -> Result<(), SyncError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
