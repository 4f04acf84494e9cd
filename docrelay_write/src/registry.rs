//! Lazily-populated mapping from collection name to its buffer.

use crate::backend::BackendClient;
use crate::buffer::{BufferConfig, CollectionBuffer, FlushObserver};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every [`CollectionBuffer`] in the process.
///
/// Buffers are created on first reference and never evicted. The registry
/// lock covers only the lookup-or-create step; everything a caller does with
/// the returned buffer happens without it, so collections never contend with
/// each other.
#[derive(Debug)]
pub struct BufferRegistry {
    buffers: Mutex<HashMap<Arc<str>, Arc<CollectionBuffer>>>,
    config: BufferConfig,
    backend: Arc<dyn BackendClient>,
    observer: Arc<dyn FlushObserver>,
    metrics: Arc<metric::Registry>,
}

impl BufferRegistry {
    pub fn new(
        config: BufferConfig,
        backend: Arc<dyn BackendClient>,
        observer: Arc<dyn FlushObserver>,
        metrics: Arc<metric::Registry>,
    ) -> Self {
        Self {
            buffers: Default::default(),
            config,
            backend,
            observer,
            metrics,
        }
    }

    /// Returns the buffer for `name`, creating it exactly once on first use.
    ///
    /// A construction failure leaves `name` unregistered, so a later request
    /// for the same collection retries creation.
    pub fn resolve(&self, name: &str) -> Result<Arc<CollectionBuffer>> {
        let mut buffers = self.buffers.lock();
        if let Some(buffer) = buffers.get(name) {
            return Ok(Arc::clone(buffer));
        }

        let buffer = CollectionBuffer::new(
            name,
            self.config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.observer),
            &self.metrics,
        )?;
        buffers.insert(Arc::from(name), Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Snapshot of every live buffer.
    pub fn buffers(&self) -> Vec<Arc<CollectionBuffer>> {
        self.buffers.lock().values().map(Arc::clone).collect()
    }

    /// Stops every buffer's flusher; each attempts one final best-effort
    /// flush of its remaining operations.
    pub async fn shutdown(&self) {
        for buffer in self.buffers() {
            buffer.shutdown().await;
        }
    }
}
