//! HTTP service implementation for the bulk endpoint and the passthrough
//! proxy.

use bytes::{Bytes, BytesMut};
use docrelay_write::BulkSink;
use futures::StreamExt;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Body, Method, Request, Response, StatusCode};
use metric::{Metric, U64Counter};
use observability_deps::tracing::{debug, error};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// The one path this service decodes instead of proxying.
pub const BULK_PATH: &str = "/_bulk";

/// The fixed acknowledgment returned for every bulk request, written before
/// decode and dispatch complete. Callers are never told about failures
/// synchronously; logs and metrics are the only witnesses.
const BULK_ACK_BODY: &str = "{\"errors\": false, \"items\": []}";

/// Headers that describe the connection rather than the payload, stripped in
/// both directions of the proxy. Header names compare lowercased.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors returned by the HTTP request handler.
#[derive(Debug, Error)]
pub enum Error {
    /// The client disconnected.
    #[error("client disconnected")]
    ClientHangup(hyper::Error),

    /// The client sent a request body that exceeds the configured maximum.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    /// Forwarding a passthrough request to the backend failed.
    #[error("error forwarding request to the backend: {0}")]
    ProxyRequest(#[from] reqwest::Error),

    /// Building a response failed.
    #[error("http error: {0}")]
    Http(#[from] hyper::http::Error),
}

impl Error {
    /// Convert the error into an appropriate [`StatusCode`] to be returned to
    /// the end user.
    pub fn as_status_code(&self) -> StatusCode {
        match self {
            Self::ClientHangup(_) => StatusCode::BAD_REQUEST,
            Self::RequestSizeExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ProxyRequest(_) => StatusCode::BAD_GATEWAY,
            Self::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// This type services every request on the API listener: `POST /_bulk` is
/// decoded and dispatched into the write engine, everything else is relayed
/// verbatim to the backend.
#[derive(Debug)]
pub struct HttpDelegate<D> {
    max_request_bytes: usize,
    sink: Arc<D>,
    proxy_base: Url,
    proxy_client: reqwest::Client,
    bulk_requests: Metric<U64Counter>,
    proxy_requests: Metric<U64Counter>,
}

impl<D> HttpDelegate<D>
where
    D: BulkSink,
{
    /// Initialise a new [`HttpDelegate`] passing decoded bulk requests to
    /// `sink` and everything else to the backend at `proxy_base`.
    ///
    /// Bulk request bodies are limited to `max_request_bytes` in size.
    pub fn new(
        max_request_bytes: usize,
        sink: Arc<D>,
        proxy_base: Url,
        proxy_client: reqwest::Client,
        metrics: &metric::Registry,
    ) -> Self {
        let bulk_requests = metrics.register_metric::<U64Counter>(
            "docrelay_bulk_requests_served",
            "bulk endpoint requests served, by HTTP method",
        );
        let proxy_requests = metrics.register_metric::<U64Counter>(
            "docrelay_proxy_requests_served",
            "passthrough requests served, by HTTP method",
        );
        Self {
            max_request_bytes,
            sink,
            proxy_base,
            proxy_client,
            bulk_requests,
            proxy_requests,
        }
    }

    /// Routes `req` to the appropriate handler, returning the handler
    /// response.
    pub async fn route(&self, req: Request<Body>) -> Result<Response<Body>> {
        let method = req.method().clone();
        match (&method, req.uri().path()) {
            (&Method::POST, BULK_PATH) => {
                self.bulk_requests
                    .recorder([("method", method.as_str().to_string())])
                    .inc(1);
                self.bulk_handler(req).await
            }
            _ => {
                self.proxy_requests
                    .recorder([("method", method.as_str().to_string())])
                    .inc(1);
                self.proxy_handler(req).await
            }
        }
    }

    /// Acknowledges the request, then decodes and dispatches in a detached
    /// task.
    ///
    /// The acknowledgment never depends on the outcome: the endpoint is
    /// fire-and-forget by contract, and that includes a body that cannot be
    /// read at all.
    async fn bulk_handler(&self, req: Request<Body>) -> Result<Response<Body>> {
        match self.read_body(req).await {
            Ok(body) => {
                let sink = Arc::clone(&self.sink);
                tokio::spawn(async move {
                    let body = match std::str::from_utf8(&body) {
                        Ok(body) => body,
                        Err(err) => {
                            error!(%err, "bulk request body is not valid utf8");
                            return;
                        }
                    };
                    let summary = sink.dispatch(body).await;
                    match &summary.decode_error {
                        Some(err) => error!(
                            %err,
                            enqueued = summary.enqueued,
                            dropped = summary.dropped,
                            "bulk request partially dispatched"
                        ),
                        None => debug!(
                            enqueued = summary.enqueued,
                            dropped = summary.dropped,
                            "bulk request dispatched"
                        ),
                    }
                });
            }
            Err(err) => {
                error!(%err, "failed to read bulk request body, acknowledging anyway");
            }
        }

        bulk_ack()
    }

    /// Relays `req` to the backend unchanged, streaming both bodies.
    async fn proxy_handler(&self, req: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = req.into_parts();

        let mut url = self.proxy_base.clone();
        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());

        let mut headers = parts.headers;
        headers.remove(HOST);
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(*name);
        }

        let upstream = self
            .proxy_client
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;

        let mut response = Response::builder().status(upstream.status());
        for (name, value) in upstream.headers() {
            if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                response = response.header(name, value);
            }
        }
        response
            .body(Body::wrap_stream(upstream.bytes_stream()))
            .map_err(Into::into)
    }

    /// Parse the request's body into raw bytes, applying the configured size
    /// limit.
    async fn read_body(&self, req: Request<Body>) -> Result<Bytes> {
        let mut payload = req.into_body();

        let mut body = BytesMut::new();
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(Error::ClientHangup)?;
            // limit max size of in-memory payload
            if (body.len() + chunk.len()) > self.max_request_bytes {
                return Err(Error::RequestSizeExceeded(self.max_request_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn bulk_ack() -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json; charset=UTF-8")
        .body(Body::from(BULK_ACK_BODY))
        .map_err(Into::into)
}
