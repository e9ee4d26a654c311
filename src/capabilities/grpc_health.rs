use crate::dispatcher::Capability;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

/// `check_grpc_health` — calls the standard gRPC health-checking protocol
/// (`grpc.health.v1.Health/Check`) against `host:port` for the server's
/// overall status (§4.8).
pub struct CheckGrpcHealth;

#[async_trait]
impl Capability for CheckGrpcHealth {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = params.get("host").and_then(|v| v.as_str()).unwrap_or("localhost").to_string();
        let port = params.get("port").and_then(|v| v.as_i64()).ok_or("missing 'port' parameter")?;
        let timeout_secs = params.get("timeout").and_then(|v| v.as_i64()).unwrap_or(5) as u64;

        let started = Instant::now();
        let endpoint = format!("http://{host}:{port}");

        let status = tokio::time::timeout(Duration::from_secs(timeout_secs), check(endpoint))
            .await
            .unwrap_or_else(|_elapsed| "UNKNOWN".to_string());

        Ok(serde_json::json!({
            "host": host,
            "port": port,
            "status": status,
            "latency_ms": started.elapsed().as_millis() as u64,
        })
        .to_string())
    }
}

async fn check(endpoint: String) -> String {
    let channel = match tonic::transport::Channel::from_shared(endpoint) {
        Ok(endpoint) => match endpoint.connect().await {
            Ok(channel) => channel,
            Err(_) => return "UNKNOWN".to_string(),
        },
        Err(_) => return "UNKNOWN".to_string(),
    };

    let mut client = HealthClient::new(channel);
    match client.check(HealthCheckRequest { service: String::new() }).await {
        Ok(response) => status_name(response.into_inner().status),
        Err(status) if status.code() == tonic::Code::NotFound => "SERVICE_UNKNOWN".to_string(),
        Err(_) => "UNKNOWN".to_string(),
    }
}

fn status_name(status: i32) -> String {
    match status {
        1 => "SERVING",
        2 => "NOT_SERVING",
        3 => "SERVICE_UNKNOWN",
        _ => "UNKNOWN",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_status_codes() {
        assert_eq!(status_name(1), "SERVING");
        assert_eq!(status_name(2), "NOT_SERVING");
        assert_eq!(status_name(3), "SERVICE_UNKNOWN");
        assert_eq!(status_name(0), "UNKNOWN");
        assert_eq!(status_name(99), "UNKNOWN");
    }
}
