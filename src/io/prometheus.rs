//! Prometheus metrics HTTP endpoint
//!
//! Exposes refresh metrics in Prometheus text format at /metrics, a liveness
//! probe at /health, and POST /refresh as a manual trigger for headless runs.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, LATENCY_BUCKET_BOUNDS_MS};
use crate::services::refresh::RefreshCycle;
use crate::services::tracker::TriggerHandle;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format all metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, in_flight: usize) -> String {
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "iss_refreshes_started_total",
        "Refresh cycles started",
        MetricType::Counter,
        metrics.refreshes_started(),
    );
    write_metric(
        &mut output,
        "iss_refreshes_rendered_total",
        "Refresh cycles that rendered a position",
        MetricType::Counter,
        metrics.refreshes_rendered(),
    );
    write_metric(
        &mut output,
        "iss_refreshes_stale_total",
        "Successful fetches dropped because a newer cycle had rendered",
        MetricType::Counter,
        metrics.stale_dropped(),
    );

    let _ = writeln!(output, "# HELP iss_refresh_failures_total Failed refresh cycles by kind");
    let _ = writeln!(output, "# TYPE iss_refresh_failures_total counter");
    for (kind, count) in metrics.failures_by_kind() {
        let _ = writeln!(output, "iss_refresh_failures_total{{kind=\"{kind}\"}} {count}");
    }

    write_metric(
        &mut output,
        "iss_refreshes_in_flight",
        "Refresh cycles currently waiting on the network",
        MetricType::Gauge,
        in_flight as u64,
    );
    write_metric(
        &mut output,
        "iss_last_success_timestamp_seconds",
        "Observation time of the last rendered position",
        MetricType::Gauge,
        metrics.last_success_unix(),
    );

    let (buckets, sum) = metrics.latency_histogram();
    let name = "iss_fetch_latency_ms";
    let _ = writeln!(output, "# HELP {name} Position fetch latency in milliseconds");
    let _ = writeln!(output, "# TYPE {name} histogram");
    let mut cumulative = 0u64;
    for (i, &bound) in LATENCY_BUCKET_BOUNDS_MS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[buckets.len() - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");

    output
}

/// State shared by all connections
#[derive(Clone)]
pub struct MetricsEndpoint {
    pub cycle: Arc<RefreshCycle>,
    pub trigger: Option<TriggerHandle>,
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    endpoint: MetricsEndpoint,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body =
                format_prometheus_metrics(endpoint.cycle.metrics(), endpoint.cycle.in_flight());
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::POST, "/refresh") => {
            let accepted = endpoint.trigger.as_ref().map(|t| t.request_refresh()).unwrap_or(false);
            if accepted {
                info!("manual_refresh_requested");
                Ok(Response::builder()
                    .status(StatusCode::ACCEPTED)
                    .header("Content-Type", "application/json")
                    .body(Full::new(Bytes::from(r#"{"ok":true}"#)))
                    .expect("static response should not fail"))
            } else {
                Ok(Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .header("Content-Type", "application/json")
                    .body(Full::new(Bytes::from(r#"{"ok":false,"error":"tracker_not_running"}"#)))
                    .expect("static response should not fail"))
            }
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    endpoint: MetricsEndpoint,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let endpoint = endpoint.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let endpoint = endpoint.clone();
                                async move { handle_request(req, endpoint).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::FailureKind;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_refresh_started();
        metrics.record_refresh_started();
        metrics.record_fetch_latency(40);
        metrics.record_fetch_latency(700);
        metrics.record_rendered(1_700_000_000);
        metrics.record_failure(FailureKind::ServerError(500));

        let output = format_prometheus_metrics(&metrics, 1);

        assert!(output.contains("iss_refreshes_started_total 2"));
        assert!(output.contains("iss_refreshes_rendered_total 1"));
        assert!(output.contains("iss_refresh_failures_total{kind=\"server_error\"} 1"));
        assert!(output.contains("iss_refresh_failures_total{kind=\"timeout\"} 0"));
        assert!(output.contains("iss_refreshes_in_flight 1"));
        assert!(output.contains("iss_last_success_timestamp_seconds 1700000000"));
        assert!(output.contains("iss_fetch_latency_ms_bucket{le=\"50\"} 1"));
        assert!(output.contains("iss_fetch_latency_ms_bucket{le=\"500\"} 1"));
        assert!(output.contains("iss_fetch_latency_ms_bucket{le=\"1000\"} 2"));
        assert!(output.contains("iss_fetch_latency_ms_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("iss_fetch_latency_ms_sum 740"));
    }
}
