use crate::dispatcher::Capability;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// `check_tcp_health` — inspects the kernel's live TCP socket state for a
/// listening `port` on `interface`, via `ss -ti`, and reports retransmits,
/// queue depths and RTT the way an operator chasing a throughput complaint
/// would read them off `ss` by hand (§4.8).
pub struct CheckTcpHealth;

#[async_trait]
impl Capability for CheckTcpHealth {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let interface = params
            .get("interface")
            .and_then(|v| v.as_str())
            .ok_or("missing 'interface' parameter")?
            .to_string();
        let port = params.get("port").and_then(|v| v.as_i64()).ok_or("missing 'port' parameter")?;

        let output = tokio::process::Command::new("ss")
            .arg("-ti")
            .arg(format!("( sport = :{port} )"))
            .output()
            .await
            .map_err(|e| format!("failed to launch ss: {e}"))?;

        let raw = String::from_utf8_lossy(&output.stdout).to_string();
        let socket = parse_socket_line(&raw).ok_or_else(|| format!("no established socket found on port {port}"))?;
        let info = parse_tcp_info(&raw);

        let send_queue = socket.send_queue;
        let recv_queue = socket.recv_queue;
        let recommended_buffer_size = recommend_buffer_size(send_queue, recv_queue, info.rtt_ms);

        Ok(serde_json::json!({
            "state": socket.state,
            "port": port,
            "interface": interface,
            "retransmits": info.retransmits,
            "send_queue_bytes": send_queue,
            "recv_queue_bytes": recv_queue,
            "rtt_ms": info.rtt_ms,
            "recommended_buffer_size": recommended_buffer_size,
        })
        .to_string())
    }
}

struct SocketLine {
    state: String,
    recv_queue: u64,
    send_queue: u64,
}

fn socket_line_pattern() -> Regex {
    Regex::new(r"^(\S+)\s+(\d+)\s+(\d+)\s+").unwrap()
}

fn parse_socket_line(raw: &str) -> Option<SocketLine> {
    for line in raw.lines() {
        if let Some(caps) = socket_line_pattern().captures(line) {
            if &caps[1] == "State" {
                continue;
            }
            return Some(SocketLine {
                state: caps[1].to_string(),
                recv_queue: caps[2].parse().ok()?,
                send_queue: caps[3].parse().ok()?,
            });
        }
    }
    None
}

struct TcpInfo {
    retransmits: u64,
    rtt_ms: f64,
}

fn retrans_pattern() -> Regex {
    Regex::new(r"retrans:(\d+)/(\d+)").unwrap()
}

fn rtt_pattern() -> Regex {
    Regex::new(r"rtt:([0-9.]+)").unwrap()
}

/// The per-socket detail line (`retrans:`, `rtt:`) is indented beneath the
/// summary line `ss -ti` prints for each connection.
fn parse_tcp_info(raw: &str) -> TcpInfo {
    let retransmits = retrans_pattern()
        .captures(raw)
        .and_then(|c| c[2].parse().ok())
        .unwrap_or(0);
    let rtt_ms = rtt_pattern().captures(raw).and_then(|c| c[1].parse().ok()).unwrap_or(0.0);
    TcpInfo { retransmits, rtt_ms }
}

/// Doubles the larger of the two observed queue depths, floored at 64 KiB and
/// capped at 16 MiB — a conservative nudge toward the kernel defaults
/// operators bump to when a socket is saturating its current buffer.
fn recommend_buffer_size(send_queue: u64, recv_queue: u64, rtt_ms: f64) -> u64 {
    let observed = send_queue.max(recv_queue).max(1);
    let bdp_scaled = (observed as f64 * (1.0 + rtt_ms / 100.0)) as u64;
    bdp_scaled.max(65_536).min(16 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socket_summary_line() {
        let raw = "State  Recv-Q Send-Q Local Address:Port Peer Address:Port\nESTAB  0      1024   10.0.0.1:443        10.0.0.2:54321\n";
        let socket = parse_socket_line(raw).unwrap();
        assert_eq!(socket.state, "ESTAB");
        assert_eq!(socket.send_queue, 1024);
    }

    #[test]
    fn parses_retransmits_and_rtt() {
        let raw = "ESTAB 0 0 10.0.0.1:443 10.0.0.2:1\n\t cubic wscale:7,7 rto:204 rtt:12.5/6 retrans:3/20 rcv_space:14480";
        let info = parse_tcp_info(raw);
        assert_eq!(info.retransmits, 20);
        assert!((info.rtt_ms - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn recommends_within_bounds() {
        assert_eq!(recommend_buffer_size(0, 0, 0.0), 65_536);
        assert_eq!(recommend_buffer_size(1 << 30, 0, 0.0), 16 * 1024 * 1024);
    }
}
