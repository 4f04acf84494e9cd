//! The metrics listener and the Prometheus text exposition encoder.

use hyper::header::CONTENT_TYPE;
use hyper::server::conn::{AddrIncoming, AddrStream};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use metric::{Attributes, MetricKind, Observation, Reporter};
use observability_deps::tracing::debug;
use std::convert::Infallible;
use std::fmt::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves `GET /metrics` and `GET /health` on a listener of its own, so
/// scrapes never compete with proxied traffic.
pub async fn serve_metrics(
    metrics: Arc<metric::Registry>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let addr = AddrIncoming::from_listener(listener)?;
    hyper::Server::builder(addr)
        .serve(make_service_fn(move |_conn: &AddrStream| {
            let metrics = Arc::clone(&metrics);
            futures::future::ready(Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = Arc::clone(&metrics);
                async move { Ok::<_, Infallible>(route_metrics_request(&metrics, req)) }
            })))
        }))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn route_metrics_request(metrics: &metric::Registry, req: Request<Body>) -> Response<Body> {
    debug!(method = %req.method(), uri = %req.uri(), "metrics listener request");
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => handle_metrics(metrics),
        (&Method::GET, "/health") => Response::new(Body::from("OK")),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}

fn handle_metrics(metrics: &metric::Registry) -> Response<Body> {
    let mut body = String::new();
    let mut encoder = PrometheusTextEncoder::new(&mut body);
    metrics.report(&mut encoder);

    Response::builder()
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

/// A [`Reporter`] rendering the Prometheus text exposition format.
#[derive(Debug)]
pub struct PrometheusTextEncoder<'a> {
    out: &'a mut String,
    current: Option<&'static str>,
}

impl<'a> PrometheusTextEncoder<'a> {
    pub fn new(out: &'a mut String) -> Self {
        Self { out, current: None }
    }
}

impl Reporter for PrometheusTextEncoder<'_> {
    fn start_metric(&mut self, metric_name: &'static str, description: &'static str, kind: MetricKind) {
        let kind = match kind {
            MetricKind::U64Counter => "counter",
            MetricKind::U64Gauge => "gauge",
        };
        if !description.is_empty() {
            let _ = writeln!(self.out, "# HELP {metric_name} {description}");
        }
        let _ = writeln!(self.out, "# TYPE {metric_name} {kind}");
        self.current = Some(metric_name);
    }

    fn report_observation(&mut self, attributes: &Attributes, observation: Observation) {
        let name = self.current.expect("observation reported outside of a metric");
        let _ = self.out.write_str(name);
        let mut first = true;
        for (key, value) in attributes.iter() {
            let sep = if std::mem::take(&mut first) { '{' } else { ',' };
            let _ = write!(self.out, "{sep}{key}=\"{}\"", escape_label_value(value));
        }
        if !first {
            let _ = self.out.write_str("}");
        }
        let value = match observation {
            Observation::U64Counter(v) | Observation::U64Gauge(v) => v,
        };
        let _ = writeln!(self.out, " {value}");
    }

    fn finish_metric(&mut self) {
        self.current = None;
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
