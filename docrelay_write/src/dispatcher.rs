//! Routes decoded operations from an inbound bulk request into collection
//! buffers.

use crate::registry::BufferRegistry;
use crate::{BulkSink, DispatchSummary};
use async_trait::async_trait;
use docrelay_bulk::decode_operations;
use observability_deps::tracing::{error, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// The production [`BulkSink`]: walks the decoder lazily and enqueues each
/// operation as it is produced, so operations decoded before a stream-level
/// error are still dispatched.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<BufferRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<BufferRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<BufferRegistry> {
        &self.registry
    }
}

#[async_trait]
impl BulkSink for Dispatcher {
    async fn dispatch(&self, body: &str) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut seen_collections = HashSet::new();

        for result in decode_operations(body) {
            let operation = match result {
                Ok(operation) => operation,
                Err(err) => {
                    // The stream cannot be resynchronized past a corrupt
                    // record; everything decoded so far has already been
                    // enqueued.
                    error!(%err, enqueued = summary.enqueued, "aborting bulk stream decode");
                    summary.decode_error = Some(err);
                    break;
                }
            };

            let buffer = match self.registry.resolve(&operation.collection) {
                Ok(buffer) => buffer,
                Err(err) => {
                    warn!(
                        %err,
                        collection = %operation.collection,
                        "no buffer for collection, dropping operation"
                    );
                    summary.dropped += 1;
                    continue;
                }
            };

            if seen_collections.insert(operation.collection.clone()) {
                buffer.stats().requests.inc(1);
            }

            match buffer.add(operation) {
                Ok(()) => summary.enqueued += 1,
                Err(err) => {
                    warn!(%err, "buffer rejected operation, dropping");
                    summary.dropped += 1;
                }
            }
        }

        summary
    }
}
