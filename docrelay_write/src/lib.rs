//! The buffered bulk-write engine: per-collection buffers with
//! size/time-triggered flushing, the lazily-populated buffer registry, and
//! the dispatcher that feeds decoded operations into it.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod backend;
pub mod buffer;
pub mod dispatcher;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

pub use buffer::{BufferConfig, BufferStats, CollectionBuffer, FlushObserver, FlushSummary, LoggingFlushObserver};
pub use dispatcher::Dispatcher;
pub use registry::BufferRegistry;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot create buffer for collection {name:?}: {reason}")]
    BufferCreation { name: String, reason: &'static str },

    #[error("buffer for collection {collection:?} is shutting down")]
    ShuttingDown { collection: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What became of one inbound bulk request.
///
/// The HTTP layer has already acknowledged the request by the time this is
/// produced; the summary only feeds logs and metrics.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Operations decoded and enqueued into a collection buffer.
    pub enqueued: usize,
    /// Operations decoded but dropped (no buffer could be created for them).
    pub dropped: usize,
    /// The stream-level error that aborted decoding, if any.
    pub decode_error: Option<docrelay_bulk::Error>,
}

/// The seam between the HTTP front end and the write engine.
///
/// The front end is generic over this trait so it can be exercised against a
/// recording mock without buffers or a backend.
#[async_trait]
pub trait BulkSink: std::fmt::Debug + Send + Sync + 'static {
    /// Decodes `body` and routes every operation to its collection buffer.
    ///
    /// Never fails: all errors are absorbed into the summary, logged, and
    /// counted, per the fire-and-forget contract of the bulk endpoint.
    async fn dispatch(&self, body: &str) -> DispatchSummary;
}
