mod core_dump;
mod grpc_health;
mod grpc_stream;
mod network_buffers;
mod probes;
mod sysctl;
mod tcp_health;

pub use core_dump::AnalyzeCoreDump;
pub use grpc_health::CheckGrpcHealth;
pub use grpc_stream::AnalyzeGrpcStream;
pub use network_buffers::InspectNetworkBuffers;
pub use probes::{DescribeInterfaces, PingHost, ProbeHttp, ResolveDns, ScanPorts, TracerouteHost};
pub use sysctl::{ExecuteSysctlCommand, ReadSysctlValue, RestoreSysctlValue};
pub use tcp_health::CheckTcpHealth;

use crate::builder::OrchestratorBuilder;

/// The declarative registry entries matching every capability this module
/// registers via `register_builtin_capabilities`. Callers who don't need a
/// custom registry can load this directly.
pub const DEFAULT_REGISTRY_TOML: &str = r#"
[[capability]]
name = "check_tcp_health"
description = "Inspect live TCP socket state (retransmits, queues, RTT) for a listening port"
category = "network"
timeout_seconds = 10
mutating = false
[[capability.parameters]]
name = "interface"
type = "string"
required = true
[[capability.parameters]]
name = "port"
type = "int"
required = true

[[capability]]
name = "check_grpc_health"
description = "Call the standard gRPC health-checking protocol against a service"
category = "grpc"
timeout_seconds = 10
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = false
default = "localhost"
[[capability.parameters]]
name = "port"
type = "int"
required = true
[[capability.parameters]]
name = "timeout"
type = "int"
required = false
default = 5

[[capability]]
name = "analyze_grpc_stream"
description = "Watch a gRPC health stream and report drop and flow-control statistics"
category = "grpc"
timeout_seconds = 30
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = false
default = "localhost"
[[capability.parameters]]
name = "port"
type = "int"
required = true
[[capability.parameters]]
name = "duration"
type = "int"
required = false
default = 10

[[capability]]
name = "inspect_network_buffers"
description = "Read kernel socket buffer and backlog sysctls"
category = "network"
timeout_seconds = 5
mutating = false

[[capability]]
name = "read_sysctl_value"
description = "Read a single sysctl parameter's current value"
category = "sysctl"
timeout_seconds = 5
mutating = false
[[capability.parameters]]
name = "parameter"
type = "string"
required = true

[[capability]]
name = "execute_sysctl_command"
description = "Write a sysctl parameter's value, optionally persisting it across reboots"
category = "sysctl"
timeout_seconds = 10
mutating = true
rollback_capability = "restore_sysctl_value"
[[capability.parameters]]
name = "parameter"
type = "string"
required = true
[[capability.parameters]]
name = "value"
type = "string"
required = true
[[capability.parameters]]
name = "persist"
type = "bool"
required = false
default = false

[[capability]]
name = "restore_sysctl_value"
description = "Restore a sysctl parameter to a prior value (rollback target)"
category = "sysctl"
timeout_seconds = 10
mutating = false
[[capability.parameters]]
name = "parameter"
type = "string"
required = true
[[capability.parameters]]
name = "value"
type = "string"
required = true

[[capability]]
name = "analyze_core_dump"
description = "Run a debugger against a core file and classify the crash signature"
category = "diagnostics"
timeout_seconds = 60
mutating = false
[[capability.parameters]]
name = "binary_path"
type = "string"
required = true
[[capability.parameters]]
name = "core_path"
type = "string"
required = true

[[capability]]
name = "ping_host"
description = "Ping a host and report reachability"
category = "network"
timeout_seconds = 10
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = true
[[capability.parameters]]
name = "count"
type = "int"
required = false
default = 4

[[capability]]
name = "resolve_dns"
description = "Resolve a hostname to its addresses"
category = "network"
timeout_seconds = 5
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = true

[[capability]]
name = "scan_ports"
description = "Attempt a TCP connect to each of a bounded list of ports"
category = "network"
timeout_seconds = 15
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = true

[[capability]]
name = "probe_http"
description = "Issue a GET request and report status code and latency"
category = "network"
timeout_seconds = 10
mutating = false
[[capability.parameters]]
name = "url"
type = "string"
required = true

[[capability]]
name = "traceroute_host"
description = "Trace the network path to a host"
category = "network"
timeout_seconds = 30
mutating = false
[[capability.parameters]]
name = "host"
type = "string"
required = true

[[capability]]
name = "describe_interfaces"
description = "List local network interfaces and their addresses"
category = "network"
timeout_seconds = 5
mutating = false
"#;

/// Registers every built-in capability implementation with the builder,
/// mirroring the convention of wiring concrete implementations into a
/// registry at build time. Callers may still override or add more via
/// `.capability()` afterward.
pub fn register_builtin_capabilities(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    builder
        .capability("check_tcp_health", Box::new(CheckTcpHealth))
        .capability("check_grpc_health", Box::new(CheckGrpcHealth))
        .capability("analyze_grpc_stream", Box::new(AnalyzeGrpcStream))
        .capability("inspect_network_buffers", Box::new(InspectNetworkBuffers))
        .capability("read_sysctl_value", Box::new(ReadSysctlValue))
        .capability("execute_sysctl_command", Box::new(ExecuteSysctlCommand))
        .capability("restore_sysctl_value", Box::new(RestoreSysctlValue))
        .capability("analyze_core_dump", Box::new(AnalyzeCoreDump))
        .capability("ping_host", Box::new(PingHost))
        .capability("resolve_dns", Box::new(ResolveDns))
        .capability("scan_ports", Box::new(ScanPorts))
        .capability("probe_http", Box::new(ProbeHttp))
        .capability("traceroute_host", Box::new(TracerouteHost))
        .capability("describe_interfaces", Box::new(DescribeInterfaces))
}
