//! Hardware seams: running a device check and reading the board's identity.

use async_trait::async_trait;
use jig_core::{DeviceResponse, leading_int};
use std::collections::HashMap;
use std::net::{IpAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// What a device check reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: bool,
    pub response: DeviceResponse,
}

impl CheckOutcome {
    pub fn failed(reason: &str) -> Self {
        Self {
            status: false,
            response: DeviceResponse::fail(reason),
        }
    }
}

/// Runs the check for one `(group, device)`. Must return in bounded time.
#[async_trait]
pub trait DeviceCheck: Send + Sync {
    async fn check(&self, group_id: i32, device_id: i32) -> CheckOutcome;
}

/// Read-only board facts.
pub trait BoardInfo: Send + Sync {
    /// Twelve hex digits, no separators.
    fn mac_address(&self) -> Option<String>;
    fn board_ip(&self) -> Option<String>;
    /// Last measured network throughput, 0 until a measurement exists.
    fn measured_throughput(&self) -> u32;
}

/// Throughput published by the check that measures it.
#[derive(Debug, Clone, Default)]
pub struct Throughput(Arc<AtomicU32>);

impl Throughput {
    pub fn record(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// How one item is checked from the shell.
#[derive(Debug, Clone)]
pub struct ShellCheck {
    pub command: String,
    /// Report `C` so the peer confirms the result.
    pub confirm: bool,
    /// The first integer of the output is the measured throughput.
    pub throughput: bool,
}

/// Checks backed by shell commands: exit status is the verdict, the first
/// line of stdout is the response text.
pub struct ShellChecks {
    checks: HashMap<(i32, i32), ShellCheck>,
    timeout: Duration,
    throughput: Throughput,
}

impl ShellChecks {
    pub fn new(
        checks: HashMap<(i32, i32), ShellCheck>,
        timeout: Duration,
        throughput: Throughput,
    ) -> Self {
        Self {
            checks,
            timeout,
            throughput,
        }
    }
}

#[async_trait]
impl DeviceCheck for ShellChecks {
    async fn check(&self, group_id: i32, device_id: i32) -> CheckOutcome {
        let Some(check) = self.checks.get(&(group_id, device_id)) else {
            tracing::warn!("no check configured for gid = {}, did = {}", group_id, device_id);
            return CheckOutcome::failed("NO CHECK");
        };

        let run = Command::new("sh")
            .arg("-c")
            .arg(&check.command)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("gid = {}, did = {}: cannot run check: {}", group_id, device_id, e);
                return CheckOutcome::failed("EXEC ERR");
            }
            Err(_) => {
                tracing::warn!(
                    "gid = {}, did = {}: check timed out after {:?}",
                    group_id,
                    device_id,
                    self.timeout
                );
                return CheckOutcome::failed("TIMEOUT");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.lines().next().unwrap_or("").trim().to_string();
        let status = output.status.success();

        if check.throughput && status {
            self.throughput.record(leading_int(&text).max(0) as u32);
        }

        let response = if check.confirm {
            DeviceResponse::check_request(text)
        } else if status {
            DeviceResponse::pass(text)
        } else {
            DeviceResponse::fail(text)
        };
        CheckOutcome { status, response }
    }
}

/// Board identity from the Linux network stack.
pub struct LinuxBoard {
    interface: String,
    throughput: Throughput,
}

impl LinuxBoard {
    pub fn new(interface: impl Into<String>, throughput: Throughput) -> Self {
        Self {
            interface: interface.into(),
            throughput,
        }
    }
}

impl BoardInfo for LinuxBoard {
    fn mac_address(&self) -> Option<String> {
        let path = format!("/sys/class/net/{}/address", self.interface);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Some(compact_mac(&raw)),
            Err(e) => {
                tracing::warn!("cannot read {}: {}", path, e);
                None
            }
        }
    }

    fn board_ip(&self) -> Option<String> {
        // Connecting a UDP socket sends nothing; it only picks the route.
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("192.0.2.1:9").ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip.to_string()),
            _ => None,
        }
    }

    fn measured_throughput(&self) -> u32 {
        self.throughput.get()
    }
}

/// `00:1e:06:aa:bb:cc\n` -> `001E06AABBCC`.
fn compact_mac(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
