use crate::dispatcher::Capability;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

const RECOMMENDED_FLOOR: u64 = 4 * 1024 * 1024;
const RECOMMENDED_CEILING: u64 = 16 * 1024 * 1024;

/// `inspect_network_buffers` — read-only snapshot of the kernel's socket
/// buffer sysctls plus tuning advice, the values operators most often
/// suspect when diagnosing throughput or connection-drop issues (§4.8).
pub struct InspectNetworkBuffers;

#[async_trait]
impl Capability for InspectNetworkBuffers {
    async fn execute(&self, _params: HashMap<String, Value>) -> Result<String, String> {
        let snapshot = tokio::task::spawn_blocking(read_snapshot).await.map_err(|e| e.to_string())??;

        let (warnings, recommendations) = evaluate(&snapshot);
        let status = if warnings.is_empty() { "ok" } else { "warning" };

        Ok(serde_json::json!({
            "rmem_max": snapshot.rmem_max,
            "wmem_max": snapshot.wmem_max,
            "tcp_rmem_min": snapshot.tcp_rmem.0,
            "tcp_rmem_default": snapshot.tcp_rmem.1,
            "tcp_rmem_max": snapshot.tcp_rmem.2,
            "tcp_wmem_min": snapshot.tcp_wmem.0,
            "tcp_wmem_default": snapshot.tcp_wmem.1,
            "tcp_wmem_max": snapshot.tcp_wmem.2,
            "recommended_rmem_max": recommend(snapshot.rmem_max, snapshot.tcp_rmem.2),
            "recommended_wmem_max": recommend(snapshot.wmem_max, snapshot.tcp_wmem.2),
            "warnings": warnings,
            "recommendations": recommendations,
            "status": status,
        })
        .to_string())
    }
}

struct Snapshot {
    rmem_max: u64,
    wmem_max: u64,
    tcp_rmem: (u64, u64, u64),
    tcp_wmem: (u64, u64, u64),
}

fn read_snapshot() -> Result<Snapshot, String> {
    Ok(Snapshot {
        rmem_max: read_scalar("net.core.rmem_max")?,
        wmem_max: read_scalar("net.core.wmem_max")?,
        tcp_rmem: read_triplet("net.ipv4.tcp_rmem")?,
        tcp_wmem: read_triplet("net.ipv4.tcp_wmem")?,
    })
}

fn proc_path(parameter: &str) -> String {
    format!("/proc/sys/{}", parameter.replace('.', "/"))
}

fn read_scalar(parameter: &str) -> Result<u64, String> {
    std::fs::read_to_string(proc_path(parameter))
        .map_err(|e| format!("failed to read {parameter}: {e}"))?
        .trim()
        .parse()
        .map_err(|e| format!("failed to parse {parameter}: {e}"))
}

fn read_triplet(parameter: &str) -> Result<(u64, u64, u64), String> {
    let raw = std::fs::read_to_string(proc_path(parameter)).map_err(|e| format!("failed to read {parameter}: {e}"))?;
    parse_triplet(&raw).ok_or_else(|| format!("unexpected format for {parameter}: {raw:?}"))
}

fn parse_triplet(raw: &str) -> Option<(u64, u64, u64)> {
    let mut parts = raw.split_whitespace().map(|tok| tok.parse::<u64>().ok());
    Some((parts.next()??, parts.next()??, parts.next()??))
}

/// Suggests bumping `core_max` to cover the kernel's own tcp autotuning
/// ceiling when the core limit is the tighter of the two, staying within a
/// conservative 4-16 MiB band rather than chasing link-speed math we have no
/// visibility into.
fn recommend(core_max: u64, tcp_max: u64) -> u64 {
    core_max.max(tcp_max).clamp(RECOMMENDED_FLOOR, RECOMMENDED_CEILING)
}

fn evaluate(snapshot: &Snapshot) -> (Vec<String>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();

    if snapshot.rmem_max < snapshot.tcp_rmem.2 {
        warnings.push(format!(
            "net.core.rmem_max ({}) is smaller than net.ipv4.tcp_rmem's max ({})",
            snapshot.rmem_max, snapshot.tcp_rmem.2
        ));
        recommendations.push(format!(
            "raise net.core.rmem_max to at least {}",
            recommend(snapshot.rmem_max, snapshot.tcp_rmem.2)
        ));
    }
    if snapshot.wmem_max < snapshot.tcp_wmem.2 {
        warnings.push(format!(
            "net.core.wmem_max ({}) is smaller than net.ipv4.tcp_wmem's max ({})",
            snapshot.wmem_max, snapshot.tcp_wmem.2
        ));
        recommendations.push(format!(
            "raise net.core.wmem_max to at least {}",
            recommend(snapshot.wmem_max, snapshot.tcp_wmem.2)
        ));
    }

    (warnings, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_triplet() {
        assert_eq!(parse_triplet("4096\t87380\t6291456"), Some((4096, 87380, 6291456)));
        assert_eq!(parse_triplet("not a triplet"), None);
    }

    #[test]
    fn warns_when_core_max_undersized() {
        let snapshot = Snapshot {
            rmem_max: 212_992,
            wmem_max: 212_992,
            tcp_rmem: (4096, 87380, 6_291_456),
            tcp_wmem: (4096, 16384, 4_194_304),
        };
        let (warnings, recommendations) = evaluate(&snapshot);
        assert_eq!(warnings.len(), 2);
        assert_eq!(recommendations.len(), 2);
    }

    #[test]
    fn no_warnings_when_sized_correctly() {
        let snapshot = Snapshot {
            rmem_max: 16 * 1024 * 1024,
            wmem_max: 16 * 1024 * 1024,
            tcp_rmem: (4096, 87380, 6_291_456),
            tcp_wmem: (4096, 16384, 4_194_304),
        };
        let (warnings, _) = evaluate(&snapshot);
        assert!(warnings.is_empty());
    }

    #[test]
    fn recommendation_stays_within_band() {
        assert_eq!(recommend(1024, 2048), RECOMMENDED_FLOOR);
        assert_eq!(recommend(64 * 1024 * 1024, 1), RECOMMENDED_CEILING);
    }
}
