use crate::dispatcher::Capability;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

const CHANNEL_CAPACITY: usize = 100;
const NOMINAL_INTERVAL: Duration = Duration::from_secs(1);
const FLOW_CONTROL_GAP: Duration = Duration::from_secs(2);

/// `analyze_grpc_stream` — opens the health-watch stream against `host:port`
/// for `duration` seconds and reports how many of the nominally-expected
/// per-second status pushes actually arrived, flagging backends that are
/// flapping or silently stalling under backpressure (§4.8, §5).
///
/// A reader task owns the stream and is the sole writer into a bounded
/// channel of arrival timestamps; the monitoring loop here only reads from
/// it, so sequence tracking never races (§5).
pub struct AnalyzeGrpcStream;

#[async_trait]
impl Capability for AnalyzeGrpcStream {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = params.get("host").and_then(|v| v.as_str()).unwrap_or("localhost").to_string();
        let port = params.get("port").and_then(|v| v.as_i64()).ok_or("missing 'port' parameter")?;
        let duration_secs = params.get("duration").and_then(|v| v.as_i64()).unwrap_or(10).max(1) as u64;

        let endpoint = format!("http://{host}:{port}");
        let channel = tonic::transport::Channel::from_shared(endpoint)
            .map_err(|e| e.to_string())?
            .connect()
            .await
            .map_err(|e| format!("connect failed: {e}"))?;

        let mut client = HealthClient::new(channel);
        let stream = client
            .watch(HealthCheckRequest { service: String::new() })
            .await
            .map_err(|e| format!("watch failed: {e}"))?
            .into_inner();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::channel::<Instant>(CHANNEL_CAPACITY);
        let reader_errors = Arc::clone(&errors);

        let reader = tokio::spawn(read_stream(stream, tx, reader_errors));

        let deadline = Instant::now() + Duration::from_secs(duration_secs);
        let mut arrivals = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(arrival)) => arrivals.push(arrival),
                Ok(None) | Err(_elapsed) => break,
            }
        }
        reader.abort();

        let stats = compute_stream_stats(&arrivals, duration_secs);
        let errors = errors.lock().unwrap().clone();

        let mut body = serde_json::json!({
            "host": host,
            "port": port,
            "messages_sent": stats.expected,
            "messages_received": stats.received,
            "dropped_count": stats.dropped,
            "drop_percentage": stats.drop_percentage,
            "flow_control_events": stats.flow_control_events,
            "monitoring_duration_sec": duration_secs,
            "status": stats.status,
        });
        if !errors.is_empty() {
            body["errors"] = serde_json::json!(errors);
        }

        Ok(body.to_string())
    }
}

async fn read_stream(
    mut stream: tonic::Streaming<tonic_health::pb::HealthCheckResponse>,
    tx: mpsc::Sender<Instant>,
    errors: Arc<Mutex<Vec<String>>>,
) {
    loop {
        match stream.next().await {
            Some(Ok(_response)) => {
                if tx.send(Instant::now()).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => errors.lock().unwrap().push(e.to_string()),
            None => break,
        }
    }
}

struct StreamStats {
    expected: u64,
    received: u64,
    dropped: u64,
    drop_percentage: f64,
    flow_control_events: usize,
    status: &'static str,
}

/// One push is expected per `NOMINAL_INTERVAL` over the monitoring window;
/// a gap of more than `FLOW_CONTROL_GAP` between two consecutive pushes is
/// treated as a flow-control stall rather than an ordinary drop.
fn compute_stream_stats(arrivals: &[Instant], duration_secs: u64) -> StreamStats {
    let expected = (duration_secs as f64 / NOMINAL_INTERVAL.as_secs_f64()).round().max(1.0) as u64;
    let received = arrivals.len() as u64;
    let dropped = expected.saturating_sub(received);
    let drop_percentage = if expected == 0 { 0.0 } else { 100.0 * dropped as f64 / expected as f64 };

    let flow_control_events = arrivals
        .windows(2)
        .filter(|pair| pair[1].duration_since(pair[0]) > FLOW_CONTROL_GAP)
        .count();

    let status = if drop_percentage >= 50.0 {
        "error"
    } else if drop_percentage > 0.0 {
        "warning"
    } else {
        "ok"
    };

    StreamStats { expected, received, dropped, drop_percentage, flow_control_events, status }
}
