//! Mock ISS position API
//!
//! Serves `/iss-now.json` in the open-notify format for local testing.
//! The position follows a simple ground track: inclination 51.64°, one
//! orbit every ~92.7 minutes.
//!
//! Failure injection:
//! - `--fail-every N` answers every Nth request with HTTP 500
//! - `--delay-ms N` holds every response for N ms (exercise timeouts)
//! - `--flat` serves `{"latitude","longitude","timestamp"}` instead
//!
//! Usage:
//!   cargo run --bin mock-iss-api -- --port 8080 --fail-every 3 --delay-ms 200
//!   then set `api.endpoint = "http://localhost:8080/iss-now.json"`

use bytes::Bytes;
use chrono::Utc;
use clap::Parser;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const INCLINATION_DEG: f64 = 51.64;
const ORBIT_PERIOD_SECS: f64 = 5562.0;

#[derive(Parser, Debug)]
#[command(name = "mock-iss-api")]
#[command(about = "Mock ISS position endpoint for local simulation")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Answer every Nth request with a 500 (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: u64,

    /// Delay before each response (ms)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Serve the flat response shape
    #[arg(long)]
    flat: bool,
}

struct MockState {
    requests: AtomicU64,
    fail_every: u64,
    delay: Duration,
    flat: bool,
}

/// Ground track position at `unix` seconds
fn ground_track(unix: i64) -> (f64, f64) {
    let phase = (unix as f64 / ORBIT_PERIOD_SECS) * std::f64::consts::TAU;
    let latitude = INCLINATION_DEG * phase.sin();
    let longitude = ((unix as f64 / ORBIT_PERIOD_SECS) * 360.0 * 0.94) % 360.0 - 180.0;
    (latitude, longitude)
}

fn position_body(unix: i64, flat: bool) -> String {
    let (lat, lon) = ground_track(unix);
    let body = if flat {
        json!({ "latitude": lat, "longitude": lon, "timestamp": unix })
    } else {
        json!({
            "message": "success",
            "timestamp": unix,
            "iss_position": {
                "latitude": format!("{:.4}", lat),
                "longitude": format!("{:.4}", lon),
            }
        })
    };
    body.to_string()
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let n = state.requests.fetch_add(1, Ordering::Relaxed) + 1;

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let (status, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/iss-now.json") | (&Method::GET, "/") => {
            if state.fail_every > 0 && n % state.fail_every == 0 {
                println!("[MOCK] #{n} -> 500 (injected)");
                (StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"failure"}"#.to_string())
            } else {
                let body = position_body(Utc::now().timestamp(), state.flat);
                println!("[MOCK] #{n} -> 200 {body}");
                (StatusCode::OK, body)
            }
        }
        _ => (StatusCode::NOT_FOUND, r#"{"message":"not found"}"#.to_string()),
    };

    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                 Mock ISS Position API                    ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Port:            {:>5}                                   ║", args.port);
    println!("║ Fail every:      {:>5}                                   ║", args.fail_every);
    println!("║ Delay:           {:>5} ms                                ║", args.delay_ms);
    println!("║ Shape:           {:<6}                                  ║", if args.flat { "flat" } else { "nested" });
    println!("╚══════════════════════════════════════════════════════════╝");

    let state = Arc::new(MockState {
        requests: AtomicU64::new(0),
        fail_every: args.fail_every,
        delay: Duration::from_millis(args.delay_ms),
        flat: args.flat,
    });

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port))).await?;

    loop {
        let (stream, _peer) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                eprintln!("[MOCK] connection error: {e}");
            }
        });
    }
}
