//! Outbound sync: drain the local queue into the ingestion sink.

use std::sync::Arc;

use crate::config::OutboundConfig;
use crate::queue::EventQueue;
use crate::sink::EventSink;
use crate::SyncError;

/// Aggregate result of one outbound pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutboundReport {
    /// Freshly written to the store.
    pub uploaded: usize,
    /// Already present server-side; acknowledged locally.
    pub idempotent: usize,
    /// Left in the queue for a later attempt (or stuck at the ceiling).
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Drains the queue in windows and settles each entry against the sink's
/// per-event results.
#[derive(Clone)]
pub struct OutboundSync {
    queue: Arc<dyn EventQueue>,
    sink: Arc<dyn EventSink>,
    config: OutboundConfig,
}

impl OutboundSync {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        sink: Arc<dyn EventSink>,
        config: OutboundConfig,
    ) -> Self {
        Self {
            queue,
            sink,
            config,
        }
    }

    /// Upload every pending entry once.
    ///
    /// Retry pacing is the engine's job; a failed entry just stays queued
    /// with its attempt counter bumped. Entries at the retry ceiling stay in
    /// the queue for inspection and are never dropped automatically.
    pub async fn sync(&self) -> Result<OutboundReport, SyncError> {
        let pending = self.queue.get_pending().await?;
        if pending.is_empty() {
            return Ok(OutboundReport::default());
        }

        let mut report = OutboundReport::default();

        for window in pending.chunks(self.config.batch_size.max(1)) {
            let events: Vec<_> = window.iter().map(|e| e.event.clone()).collect();

            let results = match self.sink.submit_batch(&events).await {
                Ok(results) => results.into_iter().map(Some).collect::<Vec<_>>(),
                Err(err) => {
                    // Transport failure: the whole window counts as failed.
                    tracing::warn!(error = %err, "outbound window failed");
                    report.errors.push(err.to_string());
                    vec![None; window.len()]
                }
            };

            for (entry, result) in window.iter().zip(results) {
                let event_id = &entry.event.event_id;
                match result {
                    Some(result) if result.success => {
                        self.queue.acknowledge(event_id).await?;
                        self.queue.remove(event_id).await?;
                        if result.idempotent {
                            report.idempotent += 1;
                        } else {
                            report.uploaded += 1;
                        }
                    }
                    Some(result) => {
                        report.failed += 1;
                        let error = result
                            .error
                            .unwrap_or_else(|| "ingestion rejected event".to_string());
                        if entry.attempts < self.config.max_retries {
                            self.queue.increment_attempt(event_id).await?;
                            report.errors.push(error);
                        } else {
                            report
                                .errors
                                .push(format!("{event_id}: max retries exceeded"));
                        }
                    }
                    None => {
                        report.failed += 1;
                        if entry.attempts < self.config.max_retries {
                            self.queue.increment_attempt(event_id).await?;
                        } else {
                            report
                                .errors
                                .push(format!("{event_id}: max retries exceeded"));
                        }
                    }
                }
            }
        }

        tracing::info!(
            uploaded = report.uploaded,
            idempotent = report.idempotent,
            failed = report.failed,
            "outbound sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use retain_events::EventEnvelope;

    use crate::queue::InMemoryEventQueue;
    use crate::sink::{EventSink, SinkError, SinkResult};

    fn event(event_id: &str) -> EventEnvelope {
        serde_json::from_value(json!({
            "event_id": event_id,
            "type": "card_reviewed",
            "user_id": "user_1",
            "library_id": "lib_1",
            "occurred_at": "2025-01-01T00:00:00Z",
            "received_at": "2025-01-01T00:00:00Z",
            "device_id": "device-1",
            "entity": {"kind": "card", "id": "card_0001"},
            "payload": {"grade": "good", "seconds_spent": 5.0},
            "schema_version": "1"
        }))
        .unwrap()
    }

    /// Scripted sink: each call pops the next canned response.
    struct ScriptedSink {
        script: Mutex<Vec<Result<Vec<SinkResult>, SinkError>>>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedSink {
        fn new(script: Vec<Result<Vec<SinkResult>, SinkError>>) -> Self {
            Self {
                script: Mutex::new(script),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EventSink for ScriptedSink {
        async fn submit_batch(
            &self,
            events: &[EventEnvelope],
        ) -> Result<Vec<SinkResult>, SinkError> {
            self.batch_sizes.lock().unwrap().push(events.len());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(events
                    .iter()
                    .map(|_| SinkResult {
                        success: true,
                        idempotent: false,
                        error: None,
                    })
                    .collect())
            } else {
                script.remove(0)
            }
        }
    }

    fn ok(n: usize) -> Result<Vec<SinkResult>, SinkError> {
        Ok((0..n)
            .map(|_| SinkResult {
                success: true,
                idempotent: false,
                error: None,
            })
            .collect())
    }

    #[tokio::test]
    async fn empty_queue_reports_zeros() {
        let queue = Arc::new(InMemoryEventQueue::new());
        let sink = Arc::new(ScriptedSink::new(vec![]));
        let outbound = OutboundSync::new(queue, sink, OutboundConfig::default());

        let report = outbound.sync().await.unwrap();
        assert_eq!(report, OutboundReport::default());
    }

    #[tokio::test]
    async fn successful_upload_empties_the_queue() {
        let queue = Arc::new(InMemoryEventQueue::new());
        queue.enqueue(event("evt_a")).await.unwrap();
        queue.enqueue(event("evt_b")).await.unwrap();

        let sink = Arc::new(ScriptedSink::new(vec![ok(2)]));
        let outbound = OutboundSync::new(queue.clone(), sink, OutboundConfig::default());

        let report = outbound.sync().await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn windows_respect_batch_size() {
        let queue = Arc::new(InMemoryEventQueue::new());
        for i in 0..5 {
            queue.enqueue(event(&format!("evt_{i}"))).await.unwrap();
        }

        let sink = Arc::new(ScriptedSink::new(vec![ok(2), ok(2), ok(1)]));
        let config = OutboundConfig {
            batch_size: 2,
            ..OutboundConfig::default()
        };
        let outbound = OutboundSync::new(queue.clone(), sink.clone(), config);

        let report = outbound.sync().await.unwrap();
        assert_eq!(report.uploaded, 5);
        assert_eq!(*sink.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn idempotent_results_are_acknowledged_and_counted() {
        let queue = Arc::new(InMemoryEventQueue::new());
        queue.enqueue(event("evt_a")).await.unwrap();

        let sink = Arc::new(ScriptedSink::new(vec![Ok(vec![SinkResult {
            success: true,
            idempotent: true,
            error: None,
        }])]));
        let outbound = OutboundSync::new(queue.clone(), sink, OutboundConfig::default());

        let report = outbound.sync().await.unwrap();
        assert_eq!(report.idempotent, 1);
        assert_eq!(report.uploaded, 0);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transport_failure_keeps_entries_and_bumps_attempts() {
        let queue = Arc::new(InMemoryEventQueue::new());
        queue.enqueue(event("evt_a")).await.unwrap();

        let sink = Arc::new(ScriptedSink::new(vec![Err(SinkError::Transport(
            "connection refused".to_string(),
        ))]));
        let outbound = OutboundSync::new(queue.clone(), sink, OutboundConfig::default());

        let report = outbound.sync().await.unwrap();
        assert_eq!(report.failed, 1);
        let pending = queue.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn entries_at_the_ceiling_stay_for_inspection() {
        let queue = Arc::new(InMemoryEventQueue::new());
        queue.enqueue(event("evt_a")).await.unwrap();
        let id = "evt_a".parse().unwrap();
        for _ in 0..3 {
            queue.increment_attempt(&id).await.unwrap();
        }

        let sink = Arc::new(ScriptedSink::new(vec![Err(SinkError::Transport(
            "still down".to_string(),
        ))]));
        let outbound = OutboundSync::new(queue.clone(), sink, OutboundConfig::default());

        let report = outbound.sync().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.errors.iter().any(|e| e.contains("max retries exceeded")));

        // Still queued, attempts unchanged at the ceiling.
        let pending = queue.get_pending().await.unwrap();
        assert_eq!(pending[0].attempts, 3);
    }
}
