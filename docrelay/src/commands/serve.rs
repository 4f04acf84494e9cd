//! Entrypoint for the docrelay server

use crate::logging::LoggingConfig;
use docrelay_server::http::HttpDelegate;
use docrelay_server::{serve, serve_metrics};
use docrelay_write::backend::{BackendError, HttpBackend};
use docrelay_write::buffer::{BufferConfig, LoggingFlushObserver};
use docrelay_write::{BufferRegistry, Dispatcher};
use observability_deps::tracing::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The default bind address for the HTTP API.
pub const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:19200";

/// The default bind address for the metrics listener.
pub const DEFAULT_METRICS_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind address: {0}")]
    BindAddress(#[source] std::io::Error),

    #[error("cannot construct backend client: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot construct proxy client: {0}")]
    ProxyClient(#[source] reqwest::Error),

    #[error("server error: {0}")]
    Server(#[from] hyper::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// The address on which docrelay serves bulk and passthrough HTTP
    /// requests
    #[clap(
        long = "http-bind",
        env = "DOCRELAY_HTTP_BIND_ADDR",
        default_value = DEFAULT_HTTP_BIND_ADDR,
        action
    )]
    pub http_bind_address: SocketAddr,

    /// Base URL of the document store the proxy sits in front of
    #[clap(
        long = "backend-addr",
        env = "DOCRELAY_BACKEND_ADDR",
        default_value = "http://127.0.0.1:9200",
        action
    )]
    pub backend_address: Url,

    /// The address on which docrelay serves /metrics and /health
    #[clap(
        long = "metrics-bind",
        env = "DOCRELAY_METRICS_BIND_ADDR",
        default_value = DEFAULT_METRICS_BIND_ADDR,
        action
    )]
    pub metrics_bind_address: SocketAddr,

    /// Interval between timer-driven flushes of a collection buffer with
    /// pending operations
    #[clap(
        long = "flush-interval",
        env = "DOCRELAY_FLUSH_INTERVAL",
        default_value = "20s",
        action
    )]
    pub flush_interval: humantime::Duration,

    /// Buffered bytes per collection that trip an immediate flush
    #[clap(
        long = "flush-bytes",
        env = "DOCRELAY_FLUSH_BYTES",
        default_value = "4194304", // 4 MiB
        action
    )]
    pub flush_bytes: usize,

    /// How many times a failed batch submission is retried before the batch
    /// is dropped
    #[clap(
        long = "flush-retries",
        env = "DOCRELAY_FLUSH_RETRIES",
        default_value = "3",
        action
    )]
    pub flush_retries: usize,

    /// Maximum size of HTTP requests on the bulk endpoint.
    #[clap(
        long = "max-http-request-size",
        env = "DOCRELAY_MAX_HTTP_REQUEST_SIZE",
        default_value = "10485760", // 10 MiB
        action
    )]
    pub max_http_request_size: usize,
}

pub async fn command(config: Config) -> Result<()> {
    info!(
        backend = %config.backend_address,
        flush_interval = %config.flush_interval,
        flush_bytes = config.flush_bytes,
        "docrelay server starting",
    );

    let metrics = Arc::new(metric::Registry::new());

    // Construct a token to trigger clean shutdown
    let frontend_shutdown = CancellationToken::new();

    // The only construction allowed to be fatal: a proxy with no backend has
    // nothing to do.
    let backend = Arc::new(HttpBackend::new(config.backend_address.clone())?);

    let registry = Arc::new(BufferRegistry::new(
        BufferConfig {
            flush_bytes: config.flush_bytes,
            flush_interval: config.flush_interval.into(),
            flush_retries: config.flush_retries,
        },
        backend,
        Arc::new(LoggingFlushObserver),
        Arc::clone(&metrics),
    ));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));

    let proxy_client = reqwest::Client::builder()
        .build()
        .map_err(Error::ProxyClient)?;
    let delegate = Arc::new(HttpDelegate::new(
        config.max_http_request_size,
        dispatcher,
        config.backend_address,
        proxy_client,
        &metrics,
    ));

    let api_listener = TcpListener::bind(config.http_bind_address)
        .await
        .map_err(Error::BindAddress)?;
    let metrics_listener = TcpListener::bind(config.metrics_bind_address)
        .await
        .map_err(Error::BindAddress)?;

    info!(address = %config.metrics_bind_address, "serving metrics");
    let metrics_task = tokio::spawn(serve_metrics(
        Arc::clone(&metrics),
        metrics_listener,
        frontend_shutdown.clone(),
    ));

    let signal_shutdown = frontend_shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_shutdown.cancel();
        }
    });

    info!(address = %config.http_bind_address, "listening");
    serve(delegate, api_listener, frontend_shutdown).await?;

    // Drain whatever the buffers still hold, best-effort.
    info!("flushing remaining buffered operations");
    registry.shutdown().await;

    match metrics_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(%e, "metrics listener failed"),
        Err(e) => error!(%e, "metrics listener task panicked"),
    }

    Ok(())
}
