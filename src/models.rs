use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Direction of a frame relative to the watched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Destination is the watched address.
    Inbound,
    /// Source is the watched address.
    Outbound,
    Unrelated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoginStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
}

impl LoginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginStatus::Ok => "OK",
            LoginStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finalized login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRecord {
    pub server: Ipv4Addr,
    pub username: String,
    pub password: String,
    pub status: LoginStatus,
    /// Capture time of the reply that finalized the attempt.
    pub timestamp: DateTime<Utc>,
}

impl LoginRecord {
    /// The append-only log line, newline included. No escaping is applied.
    pub fn log_line(&self) -> String {
        format!(
            "FTP:,{},USER:{},PAS:{},STA:{}\n",
            self.server, self.username, self.password, self.status
        )
    }
}

/// Throughput of the report address during one wall-clock minute.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteReport {
    /// Local time at the start of the reported minute.
    pub minute: DateTime<Local>,
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

impl MinuteReport {
    pub fn received_kb(&self) -> f64 {
        self.received_bytes as f64 / 1024.0
    }

    pub fn sent_kb(&self) -> f64 {
        self.sent_bytes as f64 / 1024.0
    }
}

impl fmt::Display for MinuteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rec---{:.6}KBps---", self.received_kb())?;
        write!(f, "send---{:.6}KBps---", self.sent_kb())
    }
}
