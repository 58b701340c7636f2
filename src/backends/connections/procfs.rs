// Linux procfs-based connection source

use super::{AcquireError, ConnectionSource};
use crate::address::{format_remote_addr, format_socket_addr};
use crate::backends::{BackendPriority, SourceKind};
use crate::connection::{RawConnection, TcpStatus, UNKNOWN_PROCESS};
use procfs::ProcError;
use procfs::net::TcpState;
use procfs::process::{FDTarget, all_processes};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Connection source reading the kernel's socket tables directly.
///
/// Socket owners come from scanning every `/proc/[pid]/fd`, which only
/// works for other users' processes when running as root:
/// - /proc/net/tcp and /proc/net/tcp6 for the sockets
/// - /proc/[pid]/fd for socket inode -> pid
/// - /proc/[pid]/stat and /proc/[pid]/cmdline for names
pub struct ProcfsConnectionSource;

/// Process owning one or more sockets
#[derive(Debug, Clone, PartialEq)]
pub struct SocketOwner {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

/// One row from /proc/net/tcp{,6}
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEntry {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub status: TcpStatus,
    pub inode: u64,
}

impl ProcfsConnectionSource {
    pub fn new() -> Self {
        Self
    }

    fn socket_entries() -> Result<Vec<SocketEntry>, AcquireError> {
        let mut entries = Vec::new();
        let tcp = procfs::net::tcp().map_err(classify_error)?;
        // tcp6 is absent on kernels built without IPv6
        let tcp6 = match procfs::net::tcp6() {
            Ok(entries) => entries,
            Err(ProcError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(classify_error(e)),
        };

        for entry in tcp.into_iter().chain(tcp6) {
            entries.push(SocketEntry {
                local: entry.local_address,
                remote: entry.remote_address,
                status: map_tcp_state(&entry.state),
                inode: entry.inode,
            });
        }
        Ok(entries)
    }

    /// Socket inode -> owning process, for every process we are allowed to inspect
    fn socket_owners() -> Result<HashMap<u64, SocketOwner>, AcquireError> {
        let mut owners = HashMap::new();

        for proc_result in all_processes().map_err(classify_error)? {
            let Ok(process) = proc_result else {
                continue;
            };

            let inodes: Vec<u64> = match process.fd() {
                Ok(fds) => fds
                    .flatten()
                    .filter_map(|fd| match fd.target {
                        FDTarget::Socket(inode) => Some(inode),
                        _ => None,
                    })
                    .collect(),
                Err(e) => {
                    log::trace!("Skipping fds of PID {}: {}", process.pid(), e);
                    continue;
                }
            };
            if inodes.is_empty() {
                continue;
            }

            // The process may exit between the fd scan and here
            let name = process
                .stat()
                .map(|stat| stat.comm)
                .unwrap_or_else(|_| UNKNOWN_PROCESS.to_string());
            let command_line = process
                .cmdline()
                .map(|args| args.join(" "))
                .unwrap_or_default();

            let owner = SocketOwner {
                pid: process.pid() as u32,
                name,
                command_line,
            };
            for inode in inodes {
                owners.insert(inode, owner.clone());
            }
        }

        Ok(owners)
    }
}

impl Default for ProcfsConnectionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSource for ProcfsConnectionSource {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Privileged
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Best // Native kernel tables, no external process
    }

    fn is_available() -> bool {
        std::path::Path::new("/proc/net/tcp").exists()
    }

    fn list(&self) -> Result<Vec<RawConnection>, AcquireError> {
        let entries = Self::socket_entries()?;
        let owners = Self::socket_owners()?;
        log::debug!(
            "procfs: {} TCP sockets, {} owned socket inodes",
            entries.len(),
            owners.len()
        );
        Ok(join_sockets(entries, &owners))
    }
}

/// Attach owners to socket entries. Sockets nobody holds (TIME_WAIT, or
/// owners that exited mid-scan) keep the sentinel process name.
pub fn join_sockets(entries: Vec<SocketEntry>, owners: &HashMap<u64, SocketOwner>) -> Vec<RawConnection> {
    entries
        .into_iter()
        .map(|entry| {
            let owner = (entry.inode != 0).then(|| owners.get(&entry.inode)).flatten();
            RawConnection {
                pid: owner.map(|o| o.pid),
                process_name: owner
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| UNKNOWN_PROCESS.to_string()),
                command_line: owner.map(|o| o.command_line.clone()).unwrap_or_default(),
                local_address: format_socket_addr(&entry.local),
                remote_address: format_remote_addr(&entry.remote),
                status: entry.status,
            }
        })
        .collect()
}

pub fn map_tcp_state(state: &TcpState) -> TcpStatus {
    match state {
        TcpState::Established => TcpStatus::Established,
        TcpState::SynSent => TcpStatus::SynSent,
        TcpState::SynRecv => TcpStatus::SynRecv,
        TcpState::FinWait1 => TcpStatus::FinWait1,
        TcpState::FinWait2 => TcpStatus::FinWait2,
        TcpState::TimeWait => TcpStatus::TimeWait,
        TcpState::Close => TcpStatus::Unknown("CLOSE".to_string()),
        TcpState::CloseWait => TcpStatus::CloseWait,
        TcpState::LastAck => TcpStatus::LastAck,
        TcpState::Listen => TcpStatus::Listen,
        TcpState::Closing => TcpStatus::Closing,
        TcpState::NewSynRecv => TcpStatus::Unknown("NEW_SYN_RECV".to_string()),
    }
}

/// Permission errors on the tables themselves mean OS policy blocks this
/// source entirely; anything else is a plain failure.
fn classify_error(e: ProcError) -> AcquireError {
    match e {
        ProcError::PermissionDenied(path) => AcquireError::AccessDenied(
            path.map(|p| p.display().to_string())
                .unwrap_or_else(|| "/proc".to_string()),
        ),
        other => AcquireError::SourceFailed {
            source_name: "procfs",
            message: other.to_string(),
        },
    }
}
