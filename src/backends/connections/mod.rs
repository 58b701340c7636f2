// Connection source backends and source selection
//
// Two ways to list TCP connections:
// - privileged: read the process table directly (Linux procfs), needs root
//   to see other users' sockets
// - fallback: parse `lsof` output, works for anyone

use crate::backends::{BackendPriority, SourceKind};
use crate::connection::{ConnectionRecord, RawConnection};
use crate::friendly::FriendlyNameResolver;
use thiserror::Error;

pub mod lsof;
#[cfg(target_os = "linux")]
pub mod procfs;

pub use lsof::LsofConnectionSource;
#[cfg(target_os = "linux")]
pub use procfs::ProcfsConnectionSource;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// The OS refused access to the connection tables themselves
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{source_name} connection source failed: {message}")]
    SourceFailed {
        source_name: &'static str,
        message: String,
    },
}

/// A way of listing TCP connections on this host
pub trait ConnectionSource: Send + Sync {
    /// Source name (e.g., "procfs", "lsof")
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    fn priority(&self) -> BackendPriority;

    /// Check if this source can run on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// List all TCP connections visible to this source
    fn list(&self) -> Result<Vec<RawConnection>, AcquireError>;
}

/// Source metadata for `--list-sources`
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: &'static str,
    pub kind: SourceKind,
    pub priority: BackendPriority,
    pub available: bool,
}

impl SourceInfo {
    fn describe(source: &dyn ConnectionSource, available: bool) -> Self {
        Self {
            name: source.name(),
            kind: source.kind(),
            priority: source.priority(),
            available,
        }
    }
}

/// Detect all connection sources compiled in for this platform
pub fn detect_sources() -> Vec<SourceInfo> {
    let mut sources = Vec::new();

    #[cfg(target_os = "linux")]
    sources.push(SourceInfo::describe(
        &ProcfsConnectionSource::new(),
        ProcfsConnectionSource::is_available() && is_privileged(),
    ));

    sources.push(SourceInfo::describe(
        &LsofConnectionSource::new(),
        LsofConnectionSource::is_available(),
    ));

    // Best first
    sources.sort_by(|a, b| b.priority.cmp(&a.priority));
    sources
}

/// Whether this process runs with an effective uid of 0
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Records from one acquisition plus the source that produced them
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub records: Vec<ConnectionRecord>,
    pub source_used: SourceKind,
}

/// Picks a connection source by privilege level and enriches its output.
///
/// When privileged, the privileged source is tried first. If the OS denies
/// it access, the fallback source runs once in the same call. No retries:
/// a permission failure won't go away by asking again.
pub struct ConnectionAcquirer {
    privileged: Option<Box<dyn ConnectionSource>>,
    fallback: Box<dyn ConnectionSource>,
    is_privileged: bool,
    resolver: FriendlyNameResolver,
}

impl ConnectionAcquirer {
    /// Sources for the current platform and privilege level
    pub fn new(resolver: FriendlyNameResolver) -> Self {
        #[cfg(target_os = "linux")]
        let privileged: Option<Box<dyn ConnectionSource>> = Some(Box::new(ProcfsConnectionSource::new()));

        #[cfg(not(target_os = "linux"))]
        let privileged: Option<Box<dyn ConnectionSource>> = None;

        let is_privileged = is_privileged();
        log::debug!(
            "Connection acquirer: privileged={}, privileged source={}",
            is_privileged,
            privileged.as_ref().map(|s| s.name()).unwrap_or("none")
        );

        Self::with_sources(privileged, Box::new(LsofConnectionSource::new()), is_privileged, resolver)
    }

    pub fn with_sources(
        privileged: Option<Box<dyn ConnectionSource>>,
        fallback: Box<dyn ConnectionSource>,
        is_privileged: bool,
        resolver: FriendlyNameResolver,
    ) -> Self {
        Self {
            privileged,
            fallback,
            is_privileged,
            resolver,
        }
    }

    pub fn acquire(&self) -> Result<Acquisition, AcquireError> {
        let (raw, source_used) = self.acquire_raw()?;
        let records = raw.into_iter().map(|conn| self.enrich(conn)).collect();
        Ok(Acquisition {
            records,
            source_used,
        })
    }

    fn acquire_raw(&self) -> Result<(Vec<RawConnection>, SourceKind), AcquireError> {
        let privileged = match &self.privileged {
            Some(source) if self.is_privileged => source,
            _ => return Ok((self.fallback.list()?, self.fallback.kind())),
        };

        match privileged.list() {
            Ok(conns) => Ok((conns, privileged.kind())),
            Err(AcquireError::AccessDenied(what)) => {
                log::info!(
                    "{} denied access to {}, falling back to {}",
                    privileged.name(),
                    what,
                    self.fallback.name()
                );
                Ok((self.fallback.list()?, SourceKind::Fallback))
            }
            Err(e) => Err(e),
        }
    }

    fn enrich(&self, raw: RawConnection) -> ConnectionRecord {
        let friendly = self
            .resolver
            .resolve(&raw.process_name, raw.pid, &raw.command_line);
        ConnectionRecord::new(raw, friendly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TcpStatus;
    use crate::friendly::ContainerNameCache;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Ok(Vec<RawConnection>),
        Denied,
        Broken,
    }

    struct FakeSource {
        name: &'static str,
        kind: SourceKind,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl ConnectionSource for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn priority(&self) -> BackendPriority {
            BackendPriority::Fallback
        }

        fn is_available() -> bool {
            true
        }

        fn list(&self) -> Result<Vec<RawConnection>, AcquireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Ok(conns) => Ok(conns.clone()),
                Behavior::Denied => Err(AcquireError::AccessDenied("/proc/net/tcp".to_string())),
                Behavior::Broken => Err(AcquireError::SourceFailed {
                    source_name: "fake",
                    message: "broken".to_string(),
                }),
            }
        }
    }

    fn conn(name: &str, status: TcpStatus) -> RawConnection {
        RawConnection {
            pid: Some(42),
            process_name: name.to_string(),
            command_line: String::new(),
            local_address: "127.0.0.1:1".to_string(),
            remote_address: String::new(),
            status,
        }
    }

    fn source(
        name: &'static str,
        kind: SourceKind,
        behavior: Behavior,
    ) -> (Box<dyn ConnectionSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            name,
            kind,
            behavior,
            calls: Arc::clone(&calls),
        };
        (Box::new(source), calls)
    }

    fn resolver() -> FriendlyNameResolver {
        FriendlyNameResolver::new(Arc::new(ContainerNameCache::with_entries(HashMap::new())))
    }

    #[test]
    fn test_privileged_source_used_when_root() {
        let (privileged, priv_calls) = source(
            "procfs",
            SourceKind::Privileged,
            Behavior::Ok(vec![conn("rapportd", TcpStatus::Listen)]),
        );
        let (fallback, fb_calls) = source("lsof", SourceKind::Fallback, Behavior::Ok(vec![]));
        let acquirer = ConnectionAcquirer::with_sources(Some(privileged), fallback, true, resolver());

        let acquisition = acquirer.acquire().unwrap();
        assert_eq!(acquisition.source_used, SourceKind::Privileged);
        assert_eq!(acquisition.records[0].friendly_name, "Handoff Sync Process");
        assert_eq!(priv_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fb_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_access_denied_falls_back_once() {
        let (privileged, priv_calls) = source("procfs", SourceKind::Privileged, Behavior::Denied);
        let (fallback, fb_calls) = source(
            "lsof",
            SourceKind::Fallback,
            Behavior::Ok(vec![conn("nginx", TcpStatus::Listen)]),
        );
        let acquirer = ConnectionAcquirer::with_sources(Some(privileged), fallback, true, resolver());

        let acquisition = acquirer.acquire().unwrap();
        assert_eq!(acquisition.source_used, SourceKind::Fallback);
        assert_eq!(acquisition.records.len(), 1);
        assert_eq!(priv_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unprivileged_skips_privileged_source() {
        let (privileged, priv_calls) = source("procfs", SourceKind::Privileged, Behavior::Ok(vec![]));
        let (fallback, fb_calls) = source("lsof", SourceKind::Fallback, Behavior::Ok(vec![]));
        let acquirer = ConnectionAcquirer::with_sources(Some(privileged), fallback, false, resolver());

        let acquisition = acquirer.acquire().unwrap();
        assert_eq!(acquisition.source_used, SourceKind::Fallback);
        assert_eq!(priv_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_privileged_failure_propagates() {
        let (privileged, _) = source("procfs", SourceKind::Privileged, Behavior::Broken);
        let (fallback, fb_calls) = source("lsof", SourceKind::Fallback, Behavior::Ok(vec![]));
        let acquirer = ConnectionAcquirer::with_sources(Some(privileged), fallback, true, resolver());

        assert!(matches!(
            acquirer.acquire(),
            Err(AcquireError::SourceFailed { .. })
        ));
        assert_eq!(fb_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_privileged_source_on_platform() {
        let (fallback, fb_calls) = source("lsof", SourceKind::Fallback, Behavior::Ok(vec![]));
        let acquirer = ConnectionAcquirer::with_sources(None, fallback, true, resolver());

        assert_eq!(acquirer.acquire().unwrap().source_used, SourceKind::Fallback);
        assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detected_sources_report_their_own_priority() {
        let sources = detect_sources();
        let lsof = sources.iter().find(|s| s.name == "lsof").unwrap();
        assert_eq!(lsof.kind, SourceKind::Fallback);
        assert_eq!(lsof.priority, BackendPriority::Fallback);

        #[cfg(target_os = "linux")]
        {
            assert_eq!(sources[0].name, "procfs");
            assert_eq!(sources[0].kind, SourceKind::Privileged);
            assert_eq!(sources[0].priority, BackendPriority::Best);
        }
    }

    #[test]
    fn test_sentinel_process_keeps_sentinel_name() {
        let mut unknown = conn("-", TcpStatus::TimeWait);
        unknown.pid = None;
        let (fallback, _) = source("lsof", SourceKind::Fallback, Behavior::Ok(vec![unknown]));
        let acquirer = ConnectionAcquirer::with_sources(None, fallback, false, resolver());

        let records = acquirer.acquire().unwrap().records;
        assert_eq!(records[0].friendly_name, "-");
        assert_eq!(records[0].pid_label(), "-");
    }
}
