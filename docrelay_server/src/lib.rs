//! docrelay server implementation
//!
//! The server is responsible for handling the HTTP API: decoding bulk
//! requests into the write engine, relaying everything else to the backend,
//! and exposing the metric registry on a separate listener.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod http;
pub mod metrics;

use crate::http::HttpDelegate;
use docrelay_write::BulkSink;
use hyper::server::conn::{AddrIncoming, AddrStream};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use observability_deps::tracing::{debug, error};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use metrics::serve_metrics;

/// Serves the bulk/passthrough API on `listener` until `shutdown` fires.
pub async fn serve<D>(
    delegate: Arc<HttpDelegate<D>>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error>
where
    D: BulkSink,
{
    let addr = AddrIncoming::from_listener(listener)?;
    hyper::Server::builder(addr)
        .serve(make_service_fn(move |_conn: &AddrStream| {
            let delegate = Arc::clone(&delegate);
            futures::future::ready(Ok::<_, Infallible>(service_fn(move |req| {
                route_request(Arc::clone(&delegate), req)
            })))
        }))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn route_request<D>(
    delegate: Arc<HttpDelegate<D>>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible>
where
    D: BulkSink,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    let content_length = req.headers().get("content-length").cloned();

    match delegate.route(req).await {
        Ok(response) => {
            debug!(%method, %uri, status = %response.status(), "processed request");
            Ok(response)
        }
        Err(error) => {
            error!(%error, %method, %uri, ?content_length, "error while handling request");
            Ok(error_response(&error))
        }
    }
}

fn error_response(error: &http::Error) -> Response<Body> {
    Response::builder()
        .status(error.as_status_code())
        .body(Body::from(error.to_string()))
        .unwrap()
}
