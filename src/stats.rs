use crate::backends::interfaces::{InterfaceCounters, InterfaceError, InterfaceSelection, NetworkSnapshot};
use crate::connection::{ConnectionRecord, TcpStatus};
use serde::Serialize;

/// Shortest interval a rate is computed over, so two snapshots taken in the
/// same instant can't divide by zero
const MIN_RATE_INTERVAL_SECS: f64 = 0.1;

/// Connection counts for one refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStats {
    pub established: usize,
    pub listening: usize,
    pub time_wait: usize,
    pub total: usize,
}

/// Count connections by status in a single pass
pub fn aggregate(records: &[ConnectionRecord]) -> ConnectionStats {
    records
        .iter()
        .fold(ConnectionStats::default(), |mut stats, record| {
            match record.status {
                TcpStatus::Established => stats.established += 1,
                TcpStatus::Listen => stats.listening += 1,
                TcpStatus::TimeWait => stats.time_wait += 1,
                _ => {}
            }
            stats.total += 1;
            stats
        })
}

/// Combined send+receive bytes per second between two snapshots.
///
/// Counters that went backwards (interface reset) contribute zero rather
/// than a negative delta.
pub fn rate(previous: &NetworkSnapshot, current: &NetworkSnapshot) -> f64 {
    let sent = current.bytes_sent.saturating_sub(previous.bytes_sent);
    let recv = current.bytes_recv.saturating_sub(previous.bytes_recv);
    (sent + recv) as f64 / elapsed(previous, current)
}

/// Combined send+receive packets per second, clamped the same way as [`rate`]
pub fn packet_rate(previous: &NetworkSnapshot, current: &NetworkSnapshot) -> f64 {
    let sent = current.packets_sent.saturating_sub(previous.packets_sent);
    let recv = current.packets_recv.saturating_sub(previous.packets_recv);
    (sent + recv) as f64 / elapsed(previous, current)
}

fn elapsed(previous: &NetworkSnapshot, current: &NetworkSnapshot) -> f64 {
    (current.timestamp - previous.timestamp).max(MIN_RATE_INTERVAL_SECS)
}

/// Source of interface counters
pub trait CounterSource {
    fn snapshot(&mut self, selection: &InterfaceSelection) -> Result<NetworkSnapshot, InterfaceError>;

    fn interface_names(&self) -> Vec<String>;
}

impl CounterSource for InterfaceCounters {
    fn snapshot(&mut self, selection: &InterfaceSelection) -> Result<NetworkSnapshot, InterfaceError> {
        InterfaceCounters::snapshot(self, selection)
    }

    fn interface_names(&self) -> Vec<String> {
        InterfaceCounters::interface_names(self)
    }
}

/// Result of one bandwidth sample
#[derive(Debug, Clone, PartialEq)]
pub struct Bandwidth {
    pub interface: InterfaceSelection,
    /// None until two snapshots of the same interface exist
    pub bytes_per_sec: Option<f64>,
    pub packets_per_sec: Option<f64>,
    pub totals: NetworkSnapshot,
}

/// Tracks successive snapshots of the selected interface
pub struct BandwidthMonitor<C: CounterSource = InterfaceCounters> {
    counters: C,
    selection: InterfaceSelection,
    previous: Option<NetworkSnapshot>,
}

impl BandwidthMonitor<InterfaceCounters> {
    pub fn new(selection: InterfaceSelection) -> Self {
        Self::with_counters(InterfaceCounters::new(), selection)
    }
}

impl<C: CounterSource> BandwidthMonitor<C> {
    pub fn with_counters(counters: C, selection: InterfaceSelection) -> Self {
        Self {
            counters,
            selection,
            previous: None,
        }
    }

    pub fn selection(&self) -> &InterfaceSelection {
        &self.selection
    }

    /// Switch interfaces. The previous snapshot belongs to the old selection,
    /// so the rate is unavailable again until the next sample.
    pub fn select(&mut self, selection: InterfaceSelection) {
        if selection != self.selection {
            self.selection = selection;
            self.previous = None;
        }
    }

    /// Move to the next interface: all -> each named interface -> all
    pub fn cycle_interface(&mut self) -> &InterfaceSelection {
        let names = self.counters.interface_names();
        let next = match &self.selection {
            InterfaceSelection::All => names.first().cloned(),
            InterfaceSelection::Named(current) => names
                .iter()
                .position(|name| name == current)
                .and_then(|idx| names.get(idx + 1))
                .cloned(),
        };
        self.select(InterfaceSelection::from_name(next.as_deref()));
        &self.selection
    }

    /// Take a snapshot and derive rates against the previous one. A selected
    /// interface that has disappeared resets the selection to all interfaces.
    pub fn sample(&mut self) -> Bandwidth {
        let current = match self.counters.snapshot(&self.selection) {
            Ok(snapshot) => snapshot,
            Err(InterfaceError::NotFound(name)) => {
                log::warn!("Interface {} not found, showing all interfaces", name);
                self.select(InterfaceSelection::All);
                self.counters
                    .snapshot(&InterfaceSelection::All)
                    .unwrap_or_default()
            }
        };

        let (bytes_per_sec, packets_per_sec) = match &self.previous {
            Some(previous) => (Some(rate(previous, &current)), Some(packet_rate(previous, &current))),
            None => (None, None),
        };
        self.previous = Some(current);

        Bandwidth {
            interface: self.selection.clone(),
            bytes_per_sec,
            packets_per_sec,
            totals: current,
        }
    }
}

/// Format a byte rate for display (e.g., "1.5 MB/s")
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::connections::lsof::parse_lsof_output;
    use crate::connection::RawConnection;

    fn snapshot(sent: u64, recv: u64, timestamp: f64) -> NetworkSnapshot {
        NetworkSnapshot {
            bytes_sent: sent,
            bytes_recv: recv,
            packets_sent: sent / 100,
            packets_recv: recv / 100,
            timestamp,
        }
    }

    fn record(status: TcpStatus) -> ConnectionRecord {
        ConnectionRecord::new(
            RawConnection {
                pid: Some(1),
                process_name: "p".to_string(),
                command_line: String::new(),
                local_address: String::new(),
                remote_address: String::new(),
                status,
            },
            String::new(),
        )
    }

    struct FakeCounters {
        names: Vec<String>,
        readings: Vec<NetworkSnapshot>,
    }

    impl CounterSource for FakeCounters {
        fn snapshot(&mut self, selection: &InterfaceSelection) -> Result<NetworkSnapshot, InterfaceError> {
            if let InterfaceSelection::Named(name) = selection {
                if !self.names.contains(name) {
                    return Err(InterfaceError::NotFound(name.clone()));
                }
            }
            Ok(self.readings.remove(0))
        }

        fn interface_names(&self) -> Vec<String> {
            self.names.clone()
        }
    }

    #[test]
    fn test_aggregate_counts() {
        let records = vec![
            record(TcpStatus::Established),
            record(TcpStatus::Established),
            record(TcpStatus::Listen),
            record(TcpStatus::TimeWait),
            record(TcpStatus::CloseWait),
            record(TcpStatus::Unknown(String::new())),
        ];
        assert_eq!(
            aggregate(&records),
            ConnectionStats {
                established: 2,
                listening: 1,
                time_wait: 1,
                total: 6,
            }
        );
        assert_eq!(aggregate(&[]), ConnectionStats::default());
    }

    #[test]
    fn test_rate() {
        let rate = rate(&snapshot(1000, 2000, 10.0), &snapshot(3000, 6000, 12.0));
        assert_eq!(rate, 3000.0);
    }

    #[test]
    fn test_rate_counter_reset_is_clamped() {
        // sent went backwards (1000 -> 800), recv grew by 500
        let rate = rate(&snapshot(1000, 1000, 0.0), &snapshot(800, 1500, 1.0));
        assert_eq!(rate, 500.0);
        assert!(rate >= 0.0);
    }

    #[test]
    fn test_rate_zero_duration_uses_minimum_interval() {
        let rate = rate(&snapshot(0, 0, 5.0), &snapshot(100, 0, 5.0));
        assert_eq!(rate, 1000.0);
    }

    #[test]
    fn test_monitor_needs_two_snapshots() {
        let counters = FakeCounters {
            names: vec![],
            readings: vec![snapshot(0, 0, 1.0), snapshot(2048, 0, 3.0)],
        };
        let mut monitor = BandwidthMonitor::with_counters(counters, InterfaceSelection::All);

        assert_eq!(monitor.sample().bytes_per_sec, None);
        assert_eq!(monitor.sample().bytes_per_sec, Some(1024.0));
    }

    #[test]
    fn test_missing_interface_falls_back_to_all() {
        let counters = FakeCounters {
            names: vec!["eth0".to_string()],
            readings: vec![snapshot(10, 10, 1.0)],
        };
        let mut monitor =
            BandwidthMonitor::with_counters(counters, InterfaceSelection::Named("wlan9".to_string()));

        let bandwidth = monitor.sample();
        assert_eq!(bandwidth.interface, InterfaceSelection::All);
        assert_eq!(monitor.selection(), &InterfaceSelection::All);
        assert_eq!(bandwidth.totals.bytes_sent, 10);
    }

    #[test]
    fn test_cycle_interface_wraps_to_all() {
        let counters = FakeCounters {
            names: vec!["eth0".to_string(), "lo".to_string()],
            readings: vec![],
        };
        let mut monitor = BandwidthMonitor::with_counters(counters, InterfaceSelection::All);

        assert_eq!(monitor.cycle_interface(), &InterfaceSelection::Named("eth0".into()));
        assert_eq!(monitor.cycle_interface(), &InterfaceSelection::Named("lo".into()));
        assert_eq!(monitor.cycle_interface(), &InterfaceSelection::All);
    }

    #[test]
    fn test_switching_interface_resets_rate() {
        let counters = FakeCounters {
            names: vec!["eth0".to_string()],
            readings: vec![snapshot(0, 0, 1.0), snapshot(500, 0, 2.0)],
        };
        let mut monitor = BandwidthMonitor::with_counters(counters, InterfaceSelection::All);
        monitor.sample();
        monitor.cycle_interface();
        assert_eq!(monitor.sample().bytes_per_sec, None);
    }

    #[test]
    fn test_lsof_output_to_stats() {
        let output = "COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME\n\
                      node 4100 erin 21u IPv4 0x10 0t0 TCP 127.0.0.1:3000 (LISTEN)\n\
                      node 4100 erin 22u IPv4 0x11 0t0 TCP 127.0.0.1:3000->127.0.0.1:51000 (ESTABLISHED)";
        let records: Vec<ConnectionRecord> = parse_lsof_output(output)
            .into_iter()
            .map(|line| ConnectionRecord::new(line.into_raw(String::new()), String::new()))
            .collect();

        assert_eq!(records[1].pid, Some(4100));
        assert_eq!(records[1].status, TcpStatus::Established);
        assert_eq!(records[1].remote_address, "127.0.0.1:51000");

        let stats = aggregate(&records);
        assert_eq!(stats.established, 1);
        assert_eq!(stats.listening, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(512.0), "512 B/s");
        assert_eq!(format_rate(1536.0), "1.5 KB/s");
        assert_eq!(format_rate(5.0 * 1024.0 * 1024.0), "5.0 MB/s");
    }
}
