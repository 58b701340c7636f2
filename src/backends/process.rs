// Process lookups used by connection enrichment and the detail view
//
// Everything here is best-effort: a process that exits between the socket
// listing and the lookup simply produces empty fields.

use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::path::PathBuf;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System, UpdateKind, Users};

/// Point-in-time view of the process table, taken once per refresh so the
/// per-record command-line lookups don't each rescan the system.
pub struct ProcessTable {
    sys: System,
}

impl ProcessTable {
    pub fn snapshot() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_processes(ProcessRefreshKind::new().with_cmd(UpdateKind::Always)),
        );
        Self { sys }
    }

    /// Space-joined command line, or empty if the process is gone or hidden
    pub fn command_line(&self, pid: u32) -> String {
        self.sys
            .process(Pid::from_u32(pid))
            .map(|p| join_command_line(p.cmd()))
            .unwrap_or_default()
    }
}

pub fn join_command_line(parts: &[OsString]) -> String {
    parts
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Detailed information about one process.
///
/// Each field is independently optional: platforms and permissions differ in
/// what they expose, and a missing field is a normal state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessDetails {
    pub name: Option<String>,
    pub exe: Option<PathBuf>,
    pub command_line: Option<String>,
    pub created: Option<DateTime<Local>>,
    pub status: Option<String>,
    pub user: Option<String>,
    pub cwd: Option<PathBuf>,
    pub threads: Option<usize>,
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f64>,
    pub open_files: Option<Vec<PathBuf>>,
    pub connection_count: Option<usize>,
}

impl ProcessDetails {
    /// Look up a process by pid. A vanished or inaccessible process yields
    /// an empty detail set.
    pub fn lookup(pid: u32) -> Self {
        let mut sys = System::new_all();
        // CPU usage is a delta between two refreshes
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_all();

        let Some(process) = sys.process(Pid::from_u32(pid)) else {
            log::debug!("PID {} vanished before detail lookup", pid);
            return Self::default();
        };

        let users = Users::new_with_refreshed_list();
        let total_memory = sys.total_memory();
        let command_line = join_command_line(process.cmd());

        let mut details = Self {
            name: Some(process.name().to_string_lossy().into_owned()),
            exe: process.exe().map(|p| p.to_path_buf()),
            command_line: (!command_line.is_empty()).then_some(command_line),
            created: DateTime::from_timestamp(process.start_time() as i64, 0)
                .map(|utc| utc.with_timezone(&Local)),
            status: Some(process.status().to_string()),
            user: process
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|user| user.name().to_string()),
            cwd: process.cwd().map(|p| p.to_path_buf()),
            threads: process.tasks().map(|tasks| tasks.len()),
            cpu_percent: Some(process.cpu_usage()),
            memory_percent: (total_memory > 0)
                .then(|| process.memory() as f64 / total_memory as f64 * 100.0),
            open_files: None,
            connection_count: None,
        };

        #[cfg(target_os = "linux")]
        {
            let (open_files, connection_count) = linux_fd_details(pid);
            details.open_files = open_files;
            details.connection_count = connection_count;
        }

        details
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Open regular files and TCP socket count from /proc/<pid>/fd
#[cfg(target_os = "linux")]
fn linux_fd_details(pid: u32) -> (Option<Vec<PathBuf>>, Option<usize>) {
    use procfs::process::{FDTarget, Process};
    use std::collections::HashSet;

    let Ok(process) = Process::new(pid as i32) else {
        return (None, None);
    };
    let Ok(fds) = process.fd() else {
        return (None, None);
    };

    let mut files = Vec::new();
    let mut sockets = HashSet::new();
    for fd in fds.flatten() {
        match fd.target {
            FDTarget::Path(path) if !path.starts_with("/dev") => files.push(path),
            FDTarget::Socket(inode) => {
                sockets.insert(inode);
            }
            _ => {}
        }
    }

    let tcp = procfs::net::tcp().unwrap_or_default();
    let tcp6 = procfs::net::tcp6().unwrap_or_default();
    let connections = tcp
        .iter()
        .chain(tcp6.iter())
        .filter(|entry| sockets.contains(&entry.inode))
        .count();

    (Some(files), Some(connections))
}
