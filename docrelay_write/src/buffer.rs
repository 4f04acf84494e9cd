//! Per-collection operation buffering and the size/time-triggered flush
//! lifecycle.

use crate::backend::{BackendClient, BackendError};
use crate::{Error, Result};
use docrelay_bulk::{BulkAction, WriteOperation};
use metric::{Attributes, U64Counter, U64Gauge};
use observability_deps::tracing::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Buffered bytes that trip an immediate flush.
pub const DEFAULT_FLUSH_BYTES: usize = 4 * 1024 * 1024;

/// How often the timer flushes a buffer that has anything pending.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(20);

/// How many times a failed batch submission is retried before the batch is
/// dropped.
pub const DEFAULT_FLUSH_RETRIES: usize = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub flush_retries: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_retries: DEFAULT_FLUSH_RETRIES,
        }
    }
}

/// Monotonic per-collection counters, incremented only by the owning buffer
/// (and the dispatcher, for `requests`).
#[derive(Debug)]
pub struct BufferStats {
    /// Operations enqueued into the buffer.
    pub added: U64Counter,
    /// Operations in batches the backend accepted at transport level.
    pub flushed: U64Counter,
    /// Operations the backend rejected, plus whole batches dropped after the
    /// retry budget was exhausted.
    pub failed: U64Counter,
    pub indexed: U64Counter,
    pub created: U64Counter,
    pub updated: U64Counter,
    pub deleted: U64Counter,
    /// Inbound bulk requests that referenced this collection.
    pub requests: U64Counter,
    /// Bytes currently pending in the buffer.
    pub pending_bytes: U64Gauge,
}

impl BufferStats {
    fn new(registry: &metric::Registry, collection: &str) -> Self {
        let attributes = Attributes::from([("collection", collection.to_string())]);
        let counter = |name, description| {
            registry
                .register_metric::<U64Counter>(name, description)
                .recorder(attributes.clone())
        };
        Self {
            added: counter("docrelay_buffer_added", "operations enqueued"),
            flushed: counter("docrelay_buffer_flushed", "operations in delivered batches"),
            failed: counter("docrelay_buffer_failed", "operations rejected or dropped"),
            indexed: counter("docrelay_buffer_indexed", "index operations accepted"),
            created: counter("docrelay_buffer_created", "create operations accepted"),
            updated: counter("docrelay_buffer_updated", "update operations accepted"),
            deleted: counter("docrelay_buffer_deleted", "delete operations accepted"),
            requests: counter("docrelay_buffer_requests", "bulk requests referencing the collection"),
            pending_bytes: registry
                .register_metric::<U64Gauge>("docrelay_buffer_pending_bytes", "bytes currently buffered")
                .recorder(attributes),
        }
    }

    fn action_counter(&self, action: BulkAction) -> &U64Counter {
        match action {
            BulkAction::Index => &self.indexed,
            BulkAction::Create => &self.created,
            BulkAction::Update => &self.updated,
            BulkAction::Delete => &self.deleted,
        }
    }
}

/// What a completed flush delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    /// Operations in the batch.
    pub operations: usize,
    /// Operations the backend individually rejected.
    pub failed: usize,
}

/// Receives flush lifecycle events.
///
/// Injected at buffer construction so the flush engine can be exercised in
/// tests without a live backend on the other side.
pub trait FlushObserver: std::fmt::Debug + Send + Sync + 'static {
    /// A batch was delivered, possibly with per-operation failures.
    fn flush_complete(&self, collection: &str, summary: FlushSummary);

    /// A batch was dropped after exhausting the retry budget.
    fn flush_error(&self, collection: &str, error: &BackendError);
}

/// The production observer: log and move on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFlushObserver;

impl FlushObserver for LoggingFlushObserver {
    fn flush_complete(&self, collection: &str, summary: FlushSummary) {
        debug!(
            collection,
            operations = summary.operations,
            failed = summary.failed,
            "collection buffer flushed"
        );
    }

    fn flush_error(&self, collection: &str, error: &BackendError) {
        error!(%error, collection, "dropping batch after exhausting flush retries");
    }
}

#[derive(Debug, Default)]
struct BufferState {
    pending: Vec<WriteOperation>,
    pending_bytes: usize,
}

/// One collection's buffer: a pending-operation queue, its byte accumulator,
/// and the background task that flushes it.
///
/// Created once per collection name by the registry and kept for the process
/// lifetime. At most one flush is ever in flight: the single flusher task is
/// the only place a flush runs, so triggers that arrive mid-flight coalesce
/// into the next loop iteration instead of overlapping.
#[derive(Debug)]
pub struct CollectionBuffer {
    collection: Arc<str>,
    state: Mutex<BufferState>,
    flush_wakeup: Notify,
    config: BufferConfig,
    backend: Arc<dyn BackendClient>,
    observer: Arc<dyn FlushObserver>,
    stats: BufferStats,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl CollectionBuffer {
    pub(crate) fn new(
        collection: &str,
        config: BufferConfig,
        backend: Arc<dyn BackendClient>,
        observer: Arc<dyn FlushObserver>,
        metrics: &metric::Registry,
    ) -> Result<Arc<Self>> {
        if collection.is_empty() {
            return Err(Error::BufferCreation {
                name: collection.to_string(),
                reason: "collection name is empty",
            });
        }
        if collection.len() > 255 {
            return Err(Error::BufferCreation {
                name: collection.to_string(),
                reason: "collection name exceeds 255 bytes",
            });
        }
        if collection.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::BufferCreation {
                name: collection.to_string(),
                reason: "collection name contains whitespace or control characters",
            });
        }

        let buffer = Arc::new(Self {
            collection: Arc::from(collection),
            state: Mutex::new(BufferState::default()),
            flush_wakeup: Notify::new(),
            stats: BufferStats::new(metrics, collection),
            config,
            backend,
            observer,
            shutdown: CancellationToken::new(),
            flusher: Mutex::new(None),
        });

        let handle = tokio::spawn(run_flusher(Arc::clone(&buffer)));
        *buffer.flusher.lock() = Some(handle);

        info!(collection, "created collection buffer");
        Ok(buffer)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    pub fn pending_operations(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.state.lock().pending_bytes
    }

    /// Enqueues one operation.
    ///
    /// Blocks only on the swap lock, never on a flush: operations arriving
    /// while a batch is in transit land in the fresh pending sequence.
    pub fn add(&self, operation: WriteOperation) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown {
                collection: self.collection.to_string(),
            });
        }

        let over_threshold = {
            let mut state = self.state.lock();
            state.pending_bytes += operation.encoded_len();
            state.pending.push(operation);
            self.stats.pending_bytes.set(state.pending_bytes as u64);
            state.pending_bytes >= self.config.flush_bytes
        };
        self.stats.added.inc(1);

        if over_threshold {
            self.flush_wakeup.notify_one();
        }
        Ok(())
    }

    /// Swaps out the pending sequence, leaving the buffer empty for new
    /// arrivals. The flush invariant lives here: `pending` and
    /// `pending_bytes` move as one unit, under one lock acquisition.
    fn take_pending(&self) -> Option<(Vec<WriteOperation>, usize)> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        let operations = std::mem::take(&mut state.pending);
        let bytes = std::mem::replace(&mut state.pending_bytes, 0);
        self.stats.pending_bytes.set(0);
        Some((operations, bytes))
    }

    /// Submits the current pending sequence as one batch, retrying transport
    /// failures within the configured budget. No lock is held across the
    /// network call.
    async fn flush(&self) {
        let Some((operations, bytes)) = self.take_pending() else {
            return;
        };
        debug!(
            collection = %self.collection,
            operations = operations.len(),
            bytes,
            "flushing collection buffer"
        );

        let mut attempt = 0;
        let outcome = loop {
            match self.backend.bulk_write(&self.collection, &operations).await {
                Ok(outcome) => break outcome,
                Err(err) if err.is_retryable() && attempt < self.config.flush_retries => {
                    attempt += 1;
                    warn!(
                        %err,
                        collection = %self.collection,
                        attempt,
                        "bulk write failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(err) => {
                    self.stats.failed.inc(operations.len() as u64);
                    self.observer.flush_error(&self.collection, &err);
                    return;
                }
            }
        };

        let failed_positions: HashSet<usize> =
            outcome.item_failures.iter().map(|f| f.position).collect();
        for failure in &outcome.item_failures {
            warn!(
                collection = %self.collection,
                position = failure.position,
                status = failure.status,
                reason = %failure.reason,
                "backend rejected operation"
            );
        }

        self.stats.flushed.inc(operations.len() as u64);
        self.stats.failed.inc(failed_positions.len() as u64);
        for (position, operation) in operations.iter().enumerate() {
            if !failed_positions.contains(&position) {
                self.stats.action_counter(operation.action).inc(1);
            }
        }

        self.observer.flush_complete(
            &self.collection,
            FlushSummary {
                operations: operations.len(),
                failed: failed_positions.len(),
            },
        );
    }

    /// Stops the flusher, attempting one final best-effort flush of anything
    /// still pending.
    pub(crate) async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(%err, collection = %self.collection, "flusher task panicked");
            }
        }
    }
}

/// The per-buffer background task: flush on timer tick, on size trigger, and
/// once more on shutdown.
async fn run_flusher(buffer: Arc<CollectionBuffer>) {
    let start = tokio::time::Instant::now() + buffer.config.flush_interval;
    let mut interval = tokio::time::interval_at(start, buffer.config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = buffer.flush_wakeup.notified() => {}
            _ = buffer.shutdown.cancelled() => break,
        }
        buffer.flush().await;
    }

    buffer.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockResponse, RecordedBulkWrite};
    use crate::backend::{BulkWriteOutcome, ItemFailure};
    use assert_matches::assert_matches;
    use docrelay_bulk::decode_operations;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const LONG_INTERVAL: Duration = Duration::from_secs(3600);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ObserverEvent {
        Complete { collection: String, operations: usize, failed: usize },
        Error { collection: String },
    }

    #[derive(Debug)]
    struct ChannelObserver(mpsc::UnboundedSender<ObserverEvent>);

    impl FlushObserver for ChannelObserver {
        fn flush_complete(&self, collection: &str, summary: FlushSummary) {
            let _ = self.0.send(ObserverEvent::Complete {
                collection: collection.to_string(),
                operations: summary.operations,
                failed: summary.failed,
            });
        }

        fn flush_error(&self, collection: &str, _error: &BackendError) {
            let _ = self.0.send(ObserverEvent::Error {
                collection: collection.to_string(),
            });
        }
    }

    fn observer() -> (Arc<ChannelObserver>, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelObserver(tx)), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>) -> ObserverEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a flush event")
            .expect("observer channel closed")
    }

    fn ops(input: &str) -> Vec<WriteOperation> {
        decode_operations(input).collect::<Result<_, _>>().unwrap()
    }

    fn delete_op(id: &str) -> WriteOperation {
        ops(&format!("{{\"delete\":{{\"_index\":\"logs\",\"_id\":\"{id}\"}}}}\n")).remove(0)
    }

    fn buffer_with(
        config: BufferConfig,
        backend: Arc<MockBackend>,
        observer: Arc<ChannelObserver>,
    ) -> Arc<CollectionBuffer> {
        CollectionBuffer::new(
            "logs",
            config,
            backend,
            observer,
            &metric::Registry::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn add_tracks_pending_operations_and_bytes() {
        let backend = Arc::new(MockBackend::default());
        let (obs, _rx) = observer();
        let buffer = buffer_with(BufferConfig {
            flush_interval: LONG_INTERVAL,
            ..Default::default()
        }, Arc::clone(&backend), obs);

        let a = delete_op("1");
        let b = delete_op("2");
        let want_bytes = a.encoded_len() + b.encoded_len();
        buffer.add(a).unwrap();
        buffer.add(b).unwrap();

        assert_eq!(buffer.pending_operations(), 2);
        assert_eq!(buffer.pending_bytes(), want_bytes);
        assert_eq!(buffer.stats().added.fetch(), 2);
        assert_eq!(buffer.stats().pending_bytes.fetch(), want_bytes as u64);
        assert!(backend.calls().is_empty());

        buffer.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn size_threshold_triggers_flush() {
        let backend = Arc::new(MockBackend::default());
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_bytes: 1,
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            ObserverEvent::Complete {
                collection: "logs".to_string(),
                operations: 1,
                failed: 0
            }
        );

        assert_eq!(buffer.pending_operations(), 0);
        assert_eq!(buffer.pending_bytes(), 0);
        assert_matches!(backend.calls().as_slice(), [RecordedBulkWrite { collection, operations }] => {
            assert_eq!(collection, "logs");
            assert_eq!(operations.len(), 1);
        });
        assert_eq!(buffer.stats().flushed.fetch(), 1);
        assert_eq!(buffer.stats().deleted.fetch(), 1);

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn timer_triggers_flush_without_reaching_size_threshold() {
        let backend = Arc::new(MockBackend::default());
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_interval: Duration::from_millis(50),
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();
        assert_matches!(
            next_event(&mut rx).await,
            ObserverEvent::Complete { operations: 1, .. }
        );
        assert_eq!(buffer.pending_operations(), 0);

        buffer.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn operations_added_during_flush_survive_into_the_next_cycle() {
        // A backend that parks the first call until released, so the test can
        // add operations while a flush is demonstrably in flight.
        #[derive(Debug)]
        struct GatedBackend {
            inner: MockBackend,
            entered: mpsc::UnboundedSender<()>,
            gate: tokio::sync::Semaphore,
        }

        #[async_trait::async_trait]
        impl BackendClient for GatedBackend {
            async fn bulk_write(
                &self,
                collection: &str,
                operations: &[WriteOperation],
            ) -> Result<BulkWriteOutcome, BackendError> {
                let _ = self.entered.send(());
                let permit = self.gate.acquire().await.expect("gate closed");
                permit.forget();
                self.inner.bulk_write(collection, operations).await
            }
        }

        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let backend = Arc::new(GatedBackend {
            inner: MockBackend::default(),
            entered: entered_tx,
            gate: tokio::sync::Semaphore::new(0),
        });
        let (obs, mut rx) = observer();
        let buffer = CollectionBuffer::new(
            "logs",
            BufferConfig {
                flush_bytes: 1,
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend) as Arc<dyn BackendClient>,
            obs,
            &metric::Registry::new(),
        )
        .unwrap();

        // First add trips the size trigger; wait until the backend call is
        // actually in flight.
        buffer.add(delete_op("1")).unwrap();
        timeout(Duration::from_secs(5), entered_rx.recv())
            .await
            .expect("flush never reached the backend");

        // These land in the fresh pending sequence without blocking.
        buffer.add(delete_op("2")).unwrap();
        buffer.add(delete_op("3")).unwrap();
        assert_eq!(buffer.pending_operations(), 2);

        // Release the in-flight flush; the coalesced size trigger then flushes
        // the two operations that arrived mid-flight.
        backend.gate.add_permits(1);
        assert_matches!(
            next_event(&mut rx).await,
            ObserverEvent::Complete { operations: 1, .. }
        );
        backend.gate.add_permits(1);
        assert_matches!(
            next_event(&mut rx).await,
            ObserverEvent::Complete { operations: 2, .. }
        );

        let calls = backend.inner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].operations.len(), 1);
        assert_eq!(calls[1].operations.len(), 2);
        assert_eq!(
            calls[1]
                .operations
                .iter()
                .map(|op| op.document_id.clone().unwrap())
                .collect::<Vec<_>>(),
            vec!["2", "3"],
        );

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn transient_transport_failure_is_retried_without_reordering() {
        let backend = Arc::new(MockBackend::default().with_response(MockResponse::Status(503)));
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();
        buffer.add(delete_op("2")).unwrap();
        buffer.flush().await;

        assert_matches!(
            next_event(&mut rx).await,
            ObserverEvent::Complete { operations: 2, .. }
        );
        let calls = backend.calls();
        assert_eq!(calls.len(), 2, "expected the initial attempt plus one retry");
        assert_eq!(calls[0].operations, calls[1].operations);
        assert_eq!(
            calls[0]
                .operations
                .iter()
                .map(|op| op.document_id.as_deref().unwrap())
                .collect::<Vec<_>>(),
            vec!["1", "2"],
        );

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn batch_is_dropped_after_retry_budget_is_exhausted() {
        let backend = Arc::new(
            MockBackend::default()
                .with_response(MockResponse::Status(503))
                .with_response(MockResponse::Status(503)),
        );
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_bytes: 1,
                flush_interval: LONG_INTERVAL,
                flush_retries: 1,
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            ObserverEvent::Error {
                collection: "logs".to_string()
            }
        );
        assert_eq!(backend.calls().len(), 2);
        assert_eq!(buffer.stats().failed.fetch(), 1);
        assert_eq!(buffer.stats().flushed.fetch(), 0);
        // The batch is gone, not requeued.
        assert_eq!(buffer.pending_operations(), 0);

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn non_retryable_failures_are_not_retried() {
        let backend = Arc::new(MockBackend::default().with_response(MockResponse::Status(400)));
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_bytes: 1,
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();
        assert_matches!(next_event(&mut rx).await, ObserverEvent::Error { .. });
        assert_eq!(backend.calls().len(), 1);

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn stats_track_partial_failures_per_action() {
        let input = "{\"index\":{\"_index\":\"logs\",\"_id\":\"1\"}}\n{\"a\":1}\n\
                     {\"create\":{\"_index\":\"logs\",\"_id\":\"2\"}}\n{\"b\":2}\n\
                     {\"delete\":{\"_index\":\"logs\",\"_id\":\"3\"}}\n\
                     {\"update\":{\"_index\":\"logs\",\"_id\":\"4\"}}\n{\"c\":3}\n";
        let backend = Arc::new(MockBackend::default().with_response(MockResponse::Outcome(
            BulkWriteOutcome {
                item_failures: vec![ItemFailure {
                    position: 1,
                    status: 409,
                    reason: "version conflict".to_string(),
                }],
            },
        )));
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        let k = {
            let operations = ops(input);
            let k = operations.len();
            for operation in operations {
                buffer.add(operation).unwrap();
            }
            k
        };
        assert_eq!(k, 4);
        buffer.flush().await;

        assert_eq!(
            next_event(&mut rx).await,
            ObserverEvent::Complete {
                collection: "logs".to_string(),
                operations: 4,
                failed: 1
            }
        );

        let stats = buffer.stats();
        assert_eq!(stats.added.fetch(), 4);
        assert_eq!(stats.flushed.fetch(), 4);
        assert_eq!(stats.failed.fetch(), 1);
        // The create at position 1 failed; the other three count.
        assert_eq!(stats.indexed.fetch(), 1);
        assert_eq!(stats.created.fetch(), 0);
        assert_eq!(stats.deleted.fetch(), 1);
        assert_eq!(stats.updated.fetch(), 1);
        let per_action = stats.indexed.fetch()
            + stats.created.fetch()
            + stats.deleted.fetch()
            + stats.updated.fetch();
        assert_eq!(per_action, (k - 1) as u64);

        buffer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_operations_and_rejects_new_ones() {
        let backend = Arc::new(MockBackend::default());
        let (obs, mut rx) = observer();
        let buffer = buffer_with(
            BufferConfig {
                flush_interval: LONG_INTERVAL,
                ..Default::default()
            },
            Arc::clone(&backend),
            obs,
        );

        buffer.add(delete_op("1")).unwrap();
        buffer.shutdown().await;

        assert_matches!(
            next_event(&mut rx).await,
            ObserverEvent::Complete { operations: 1, .. }
        );
        assert_eq!(backend.calls().len(), 1);
        assert_matches!(
            buffer.add(delete_op("2")),
            Err(Error::ShuttingDown { .. })
        );
    }

    #[tokio::test]
    async fn buffer_creation_rejects_unusable_names() {
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::default());
        let registry = metric::Registry::new();
        let too_long = "x".repeat(256);
        for name in ["", "two words", "tab\there", too_long.as_str()] {
            assert_matches!(
                CollectionBuffer::new(
                    name,
                    BufferConfig::default(),
                    Arc::clone(&backend),
                    Arc::new(LoggingFlushObserver),
                    &registry,
                ),
                Err(Error::BufferCreation { .. })
            );
        }
    }
}
