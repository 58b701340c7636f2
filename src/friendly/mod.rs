//! Friendly service names for raw process names
//!
//! Resolution order, first match wins:
//! 1. exact alias table
//! 2. Plex media server family (`plex*`)
//! 3. Docker Desktop family (`com.docker*`), with the running container count
//! 4. command line mentioning a running container id
//! 5. the process name unchanged
//!
//! Aliases come first so an exact entry can override a pattern rule. The
//! container-id scan runs last because it walks the whole container cache.

mod containers;

pub use containers::ContainerNameCache;

use crate::connection::UNKNOWN_PROCESS;
use std::sync::Arc;

/// Exact process name -> label
const STATIC_ALIASES: &[(&str, &str)] = &[
    ("rapportd", "Handoff Sync Process"),
    ("IPNExtension", "Tailscale"),
    ("Code H", "VSCode"),
    ("Adobe H", "Adobe"),
];

const PLEX_PREFIX: &str = "plex";
const PLEX_LABEL: &str = "Plex Media Server";

const DOCKER_PREFIX: &str = "com.docker";
const DOCKER_LABEL: &str = "Docker Desktop";

#[derive(Clone)]
pub struct FriendlyNameResolver {
    containers: Arc<ContainerNameCache>,
}

impl FriendlyNameResolver {
    pub fn new(containers: Arc<ContainerNameCache>) -> Self {
        Self { containers }
    }

    /// Resolver backed by the process-wide container cache
    pub fn with_global_cache() -> Self {
        Self::new(ContainerNameCache::global())
    }

    /// Map a raw process name (and its command line) to a display label.
    ///
    /// Deterministic for a given cache state. Never returns an empty string.
    pub fn resolve(&self, process_name: &str, _pid: Option<u32>, command_line: &str) -> String {
        if let Some((_, alias)) = STATIC_ALIASES.iter().find(|(name, _)| *name == process_name) {
            return alias.to_string();
        }

        if starts_with_ignore_case(process_name, PLEX_PREFIX) {
            return PLEX_LABEL.to_string();
        }

        if starts_with_ignore_case(process_name, DOCKER_PREFIX) {
            return match self.containers.container_count() {
                0 => DOCKER_LABEL.to_string(),
                count => format!("{} ({} containers)", DOCKER_LABEL, count),
            };
        }

        if !command_line.is_empty() {
            if let Some(name) = self.container_in_command_line(command_line) {
                return format!("Docker: {}", name);
            }
        }

        if process_name.is_empty() {
            UNKNOWN_PROCESS.to_string()
        } else {
            process_name.to_string()
        }
    }

    /// Container whose id appears in the command line. Ids are compared in
    /// sorted order so overlapping ids always pick the same container.
    fn container_in_command_line(&self, command_line: &str) -> Option<&str> {
        let containers = self.containers.lookup();
        let mut ids: Vec<&String> = containers.keys().collect();
        ids.sort();
        ids.into_iter()
            .find(|id| command_line.contains(id.as_str()))
            .and_then(|id| containers.get(id))
            .map(String::as_str)
    }
}

fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix)
}
