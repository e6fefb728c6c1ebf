//! TrueNAS API Type Definitions
//!
//! The JSON-RPC envelope spoken over the WebSocket, and the slices of API
//! responses the bundled sub-collectors read. Response structs only carry the
//! fields a collector turns into samples; serde ignores the rest.
//!
//! # API Endpoints Covered
//!
//! - `pool.query` → [`Pool`], [`PoolScan`], [`Topology`], [`VDev`]
//! - `pool.dataset.query` → [`Dataset`]
//! - `disk.query` → [`DiskInfo`]
//! - `alert.list` → [`Alert`]
//! - `service.query` → [`ServiceInfo`]
//! - `system.info` → [`SystemInfo`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON-RPC method call, as issued by a sub-collector through `fetch`
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Option<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// Outgoing `{"msg": "method", ...}` frame
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub id: String,
    pub msg: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn method(id: String, method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            id,
            msg: "method",
            method,
            params,
        }
    }
}

/// Incoming frame; DDP keep-alives and handshakes carry no id
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonRpcResponse {
    pub id: Option<String>,
    pub msg: Option<String>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonRpcError {
    pub error: Option<i32>,
    pub errname: Option<String>,
    pub reason: Option<String>,
}

impl JsonRpcError {
    /// Most specific description the server gave
    pub fn into_message(self) -> String {
        self.reason
            .or(self.errname)
            .or_else(|| self.error.map(|code| format!("error code {}", code)))
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// DDP handshake sent right after the socket opens
#[derive(Debug, Serialize)]
pub struct DdpConnect {
    pub msg: &'static str,
    pub version: &'static str,
    pub support: [&'static str; 1],
}

impl Default for DdpConnect {
    fn default() -> Self {
        Self {
            msg: "connect",
            version: "1",
            support: ["1"],
        }
    }
}

/// Middleware timestamp, `{"$date": <milliseconds since epoch>}`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiDate {
    #[serde(rename = "$date")]
    pub millis: u64,
}

impl ApiDate {
    pub fn as_seconds(self) -> f64 {
        (self.millis / 1000) as f64
    }
}

/// Last scrub or resilver of a pool
#[derive(Debug, Clone, Deserialize)]
pub struct PoolScan {
    #[serde(default)]
    pub errors: Option<u64>,
    #[serde(default)]
    pub end_time: Option<ApiDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub data: Vec<VDev>,
}

/// A node of a pool's vdev tree; leaves are disks
#[derive(Debug, Clone, Deserialize)]
pub struct VDev {
    pub name: String,
    #[serde(default)]
    pub disk: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub stats: Option<VDevStats>,
    #[serde(default)]
    pub children: Vec<VDev>,
}

impl VDev {
    /// Disk name for leaves, device or vdev name otherwise
    pub fn label(&self) -> &str {
        self.disk
            .as_deref()
            .or(self.device.as_deref())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct VDevStats {
    pub read_errors: u64,
    pub write_errors: u64,
    pub checksum_errors: u64,
}

impl VDevStats {
    pub fn by_kind(&self) -> [(&'static str, u64); 3] {
        [
            ("read", self.read_errors),
            ("write", self.write_errors),
            ("checksum", self.checksum_errors),
        ]
    }
}

/// Entry of `pool.query`
#[derive(Debug, Deserialize)]
pub struct Pool {
    pub name: String,
    pub status: String,
    pub healthy: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub allocated: u64,
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub scan: Option<PoolScan>,
    #[serde(default)]
    pub topology: Option<Topology>,
}

/// Property as reported by `pool.dataset.query`; only the parsed form is read
#[derive(Debug, Clone, Deserialize)]
pub struct Parsed<T> {
    pub parsed: T,
}

/// Entry of `pool.dataset.query`
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub used: Option<Parsed<u64>>,
    #[serde(default)]
    pub available: Option<Parsed<u64>>,
    #[serde(default)]
    pub compressratio: Option<Parsed<String>>,
}

impl Dataset {
    /// First path component, which is always the pool
    pub fn pool(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    pub fn compression_ratio(&self) -> Option<f64> {
        self.compressratio.as_ref()?.parsed.parse().ok()
    }
}

/// Entry of `alert.list`
#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    pub uuid: String,
    /// CRITICAL, ERROR, WARNING or INFO
    pub level: String,
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default)]
    pub formatted: String,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.dismissed
    }
}

/// Result of `system.info`
#[derive(Debug, Deserialize)]
pub struct SystemInfo {
    pub version: String,
    pub hostname: String,
    #[serde(default)]
    pub uptime_seconds: f64,
    #[serde(default)]
    pub loadavg: Option<Vec<f64>>,
    #[serde(default)]
    pub physmem: Option<u64>,
}

/// Entry of `disk.query`
#[derive(Debug, Deserialize)]
pub struct DiskInfo {
    pub name: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub size: u64,
}

/// Entry of `service.query`
#[derive(Debug, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub state: String,
    #[serde(default)]
    pub enable: bool,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("RUNNING")
    }
}
