// Interface byte/packet counters via sysinfo

use std::fmt;
use sysinfo::Networks;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum InterfaceError {
    #[error("network interface '{0}' not found")]
    NotFound(String),
}

/// Which counters a snapshot aggregates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InterfaceSelection {
    #[default]
    All,
    Named(String),
}

impl InterfaceSelection {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            None | Some("") | Some("all") => InterfaceSelection::All,
            Some(name) => InterfaceSelection::Named(name.to_string()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            InterfaceSelection::All => None,
            InterfaceSelection::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for InterfaceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceSelection::All => f.write_str("all"),
            InterfaceSelection::Named(name) => f.write_str(name),
        }
    }
}

/// Cumulative interface counters at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkSnapshot {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Reads interface counters, keeping the sysinfo handle alive between reads
pub struct InterfaceCounters {
    networks: Networks,
}

impl InterfaceCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Names of all known interfaces, sorted
    pub fn interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.iter().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }

    /// Refresh and read the counters for `selection`
    pub fn snapshot(&mut self, selection: &InterfaceSelection) -> Result<NetworkSnapshot, InterfaceError> {
        self.networks.refresh_list();
        let timestamp = now_seconds();

        let mut snapshot = NetworkSnapshot {
            timestamp,
            ..NetworkSnapshot::default()
        };

        match selection {
            InterfaceSelection::All => {
                for (_, data) in self.networks.iter() {
                    snapshot.bytes_sent += data.total_transmitted();
                    snapshot.bytes_recv += data.total_received();
                    snapshot.packets_sent += data.total_packets_transmitted();
                    snapshot.packets_recv += data.total_packets_received();
                }
            }
            InterfaceSelection::Named(wanted) => {
                let (_, data) = self
                    .networks
                    .iter()
                    .find(|(name, _)| *name == wanted)
                    .ok_or_else(|| InterfaceError::NotFound(wanted.clone()))?;
                snapshot.bytes_sent = data.total_transmitted();
                snapshot.bytes_recv = data.total_received();
                snapshot.packets_sent = data.total_packets_transmitted();
                snapshot.packets_recv = data.total_packets_received();
            }
        }

        Ok(snapshot)
    }
}

impl Default for InterfaceCounters {
    fn default() -> Self {
        Self::new()
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_from_name() {
        assert_eq!(InterfaceSelection::from_name(None), InterfaceSelection::All);
        assert_eq!(InterfaceSelection::from_name(Some("all")), InterfaceSelection::All);
        assert_eq!(
            InterfaceSelection::from_name(Some("eth0")),
            InterfaceSelection::Named("eth0".to_string())
        );
        assert_eq!(InterfaceSelection::Named("wlan0".into()).to_string(), "wlan0");
    }

    #[test]
    fn test_unknown_interface_is_not_found() {
        let mut counters = InterfaceCounters::new();
        let result = counters.snapshot(&InterfaceSelection::Named("netshow-no-such-if0".into()));
        assert_eq!(
            result,
            Err(InterfaceError::NotFound("netshow-no-such-if0".to_string()))
        );
    }

    #[test]
    fn test_aggregate_snapshot_is_timestamped() {
        let mut counters = InterfaceCounters::new();
        let snapshot = counters.snapshot(&InterfaceSelection::All).unwrap();
        assert!(snapshot.timestamp > 0.0);
    }
}
