use serde::{Serialize, Serializer};
use std::fmt;

/// Placeholder shown when a pid or process name cannot be determined
pub const UNKNOWN_PROCESS: &str = "-";

/// TCP connection state as reported by the connection source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TcpStatus {
    Established,
    Listen,
    TimeWait,
    CloseWait,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    Closing,
    LastAck,
    /// Anything else, carried as the raw text the source reported (may be empty)
    Unknown(String),
}

impl TcpStatus {
    /// Parse the textual state names used by lsof and netstat-style tools
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "ESTABLISHED" => TcpStatus::Established,
            "LISTEN" => TcpStatus::Listen,
            "TIME_WAIT" => TcpStatus::TimeWait,
            "CLOSE_WAIT" => TcpStatus::CloseWait,
            "SYN_SENT" => TcpStatus::SynSent,
            "SYN_RECV" | "SYN_RCVD" => TcpStatus::SynRecv,
            "FIN_WAIT1" | "FIN_WAIT_1" => TcpStatus::FinWait1,
            "FIN_WAIT2" | "FIN_WAIT_2" => TcpStatus::FinWait2,
            "CLOSING" => TcpStatus::Closing,
            "LAST_ACK" => TcpStatus::LastAck,
            other => TcpStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TcpStatus::Established => "ESTABLISHED",
            TcpStatus::Listen => "LISTEN",
            TcpStatus::TimeWait => "TIME_WAIT",
            TcpStatus::CloseWait => "CLOSE_WAIT",
            TcpStatus::SynSent => "SYN_SENT",
            TcpStatus::SynRecv => "SYN_RECV",
            TcpStatus::FinWait1 => "FIN_WAIT1",
            TcpStatus::FinWait2 => "FIN_WAIT2",
            TcpStatus::Closing => "CLOSING",
            TcpStatus::LastAck => "LAST_ACK",
            TcpStatus::Unknown(raw) => raw,
        }
    }

    /// Icon shown next to the status when emojis are enabled
    pub fn icon(&self) -> &'static str {
        match self {
            TcpStatus::Established => "✅",
            TcpStatus::Listen => "👂",
            TcpStatus::TimeWait => "⏳",
            TcpStatus::CloseWait => "⏸️",
            TcpStatus::SynSent => "📤",
            TcpStatus::SynRecv => "📥",
            TcpStatus::FinWait1 => "🔄",
            TcpStatus::FinWait2 => "🔁",
            TcpStatus::Closing => "🔚",
            TcpStatus::LastAck => "🏁",
            TcpStatus::Unknown(_) => "❓",
        }
    }
}

impl fmt::Display for TcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TcpStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Connection as produced by a connection source, before enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct RawConnection {
    pub pid: Option<u32>,
    pub process_name: String,
    pub command_line: String,
    pub local_address: String,
    pub remote_address: String,
    pub status: TcpStatus,
}

/// One observed TCP connection for a single refresh cycle.
///
/// Records are rebuilt from scratch on every refresh and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub pid: Option<u32>,
    pub process_name: String,
    pub friendly_name: String,
    pub local_address: String,
    pub remote_address: String,
    pub status: TcpStatus,
}

impl ConnectionRecord {
    /// Build a record from a raw connection and its resolved friendly name.
    /// An empty friendly name falls back to the process name, then to the sentinel.
    pub fn new(raw: RawConnection, friendly_name: String) -> Self {
        let process_name = if raw.process_name.is_empty() {
            UNKNOWN_PROCESS.to_string()
        } else {
            raw.process_name
        };
        let friendly_name = if friendly_name.is_empty() {
            process_name.clone()
        } else {
            friendly_name
        };

        Self {
            pid: raw.pid,
            process_name,
            friendly_name,
            local_address: raw.local_address,
            remote_address: raw.remote_address,
            status: raw.status,
        }
    }

    pub fn pid_label(&self) -> String {
        self.pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| UNKNOWN_PROCESS.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawConnection {
        RawConnection {
            pid: None,
            process_name: name.to_string(),
            command_line: String::new(),
            local_address: "127.0.0.1:8080".to_string(),
            remote_address: String::new(),
            status: TcpStatus::Listen,
        }
    }

    #[test]
    fn test_status_parse_known_states() {
        assert_eq!(TcpStatus::parse("ESTABLISHED"), TcpStatus::Established);
        assert_eq!(TcpStatus::parse("LISTEN"), TcpStatus::Listen);
        assert_eq!(TcpStatus::parse("SYN_RCVD"), TcpStatus::SynRecv);
        assert_eq!(TcpStatus::parse("FIN_WAIT_2"), TcpStatus::FinWait2);
    }

    #[test]
    fn test_status_unknown_keeps_raw_text() {
        let status = TcpStatus::parse("BOUND");
        assert_eq!(status, TcpStatus::Unknown("BOUND".to_string()));
        assert_eq!(status.as_str(), "BOUND");
        assert_eq!(TcpStatus::parse("").as_str(), "");
        assert_eq!(status.icon(), "❓");
    }

    #[test]
    fn test_friendly_name_never_empty() {
        let record = ConnectionRecord::new(raw("nginx"), String::new());
        assert_eq!(record.friendly_name, "nginx");

        let record = ConnectionRecord::new(raw(""), String::new());
        assert_eq!(record.process_name, UNKNOWN_PROCESS);
        assert_eq!(record.friendly_name, UNKNOWN_PROCESS);
        assert_eq!(record.pid_label(), "-");
    }

    #[test]
    fn test_record_serializes_status_as_text() {
        let record = ConnectionRecord::new(raw("nginx"), "Web".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "LISTEN");
        assert_eq!(json["friendly_name"], "Web");
        assert!(json["pid"].is_null());
    }
}
