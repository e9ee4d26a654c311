use crate::dispatcher::Capability;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

fn param_str<'a>(params: &'a HashMap<String, Value>, name: &str) -> Result<&'a str, String> {
    params.get(name).and_then(|v| v.as_str()).ok_or_else(|| format!("missing '{name}' parameter"))
}

/// `ping_host` — shells out to the system `ping` binary and reports whether
/// it reported success, since sending raw ICMP requires privileges this
/// crate should not assume it has (§4.8).
pub struct PingHost;

#[async_trait]
impl Capability for PingHost {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = param_str(&params, "host")?;
        let count = params.get("count").and_then(|v| v.as_i64()).unwrap_or(4);

        let output = tokio::process::Command::new("ping")
            .arg("-c")
            .arg(count.to_string())
            .arg(host)
            .output()
            .await
            .map_err(|e| format!("failed to launch ping: {e}"))?;

        Ok(serde_json::json!({
            "success": output.status.success(),
            "output": String::from_utf8_lossy(&output.stdout).chars().take(2000).collect::<String>(),
        })
        .to_string())
    }
}

/// `resolve_dns` — resolves `host` and returns every address found.
pub struct ResolveDns;

#[async_trait]
impl Capability for ResolveDns {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = param_str(&params, "host")?;
        let addrs: Vec<String> = lookup_host((host, 0))
            .await
            .map_err(|e| format!("DNS resolution failed: {e}"))?
            .map(|addr| addr.ip().to_string())
            .collect();

        Ok(serde_json::json!({ "addresses": addrs }).to_string())
    }
}

/// `scan_ports` — attempts a TCP connect to each port in `ports` against
/// `host`, reporting which are open. Read-only, bounded to the ports the
/// caller asks for — no sweeping unsolicited ranges (§4.8 Non-goals).
pub struct ScanPorts;

#[async_trait]
impl Capability for ScanPorts {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = param_str(&params, "host")?.to_string();
        let ports = params
            .get("ports")
            .and_then(|v| v.as_array())
            .ok_or("missing 'ports' parameter (array of integers)")?;

        let mut open = Vec::new();
        for port in ports {
            let port = port.as_i64().ok_or("'ports' must contain integers")?;
            let addr = format!("{host}:{port}");
            let connected = tokio::time::timeout(Duration::from_millis(500), TcpStream::connect(&addr))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
            if connected {
                open.push(port);
            }
        }

        Ok(serde_json::json!({ "open_ports": open }).to_string())
    }
}

/// `probe_http` — issues a GET request and reports status code and latency.
pub struct ProbeHttp;

#[async_trait]
impl Capability for ProbeHttp {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let url = param_str(&params, "url")?;
        let started = std::time::Instant::now();
        let response = reqwest::get(url).await.map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "status": response.status().as_u16(),
            "latency_ms": started.elapsed().as_millis() as u64,
        })
        .to_string())
    }
}

/// `traceroute_host` — shells out to the system `traceroute` binary.
pub struct TracerouteHost;

#[async_trait]
impl Capability for TracerouteHost {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let host = param_str(&params, "host")?;

        let output = tokio::process::Command::new("traceroute")
            .arg(host)
            .output()
            .await
            .map_err(|e| format!("failed to launch traceroute: {e}"))?;

        Ok(serde_json::json!({
            "success": output.status.success(),
            "hops": String::from_utf8_lossy(&output.stdout).chars().take(4000).collect::<String>(),
        })
        .to_string())
    }
}

/// `describe_interfaces` — shells out to `ip -j addr` for a JSON listing of
/// local network interfaces, since enumerating them portably without a
/// platform-specific syscall binding is out of scope for this crate.
pub struct DescribeInterfaces;

#[async_trait]
impl Capability for DescribeInterfaces {
    async fn execute(&self, _params: HashMap<String, Value>) -> Result<String, String> {
        let output = tokio::process::Command::new("ip")
            .arg("-j")
            .arg("addr")
            .output()
            .await
            .map_err(|e| format!("failed to launch ip: {e}"))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).to_string());
        }

        let raw = String::from_utf8_lossy(&output.stdout).to_string();
        let interfaces: Value = serde_json::from_str(&raw).unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::json!({ "interfaces": interfaces }).to_string())
    }
}
