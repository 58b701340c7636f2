// Container id -> name lookup through the docker CLI

use crate::backends::command::{self, ToolError};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const DOCKER: &str = "docker";
const DOCKER_PS_ARGS: &[&str] = &["ps", "--format", "{{.ID}} {{.Names}}"];

static GLOBAL_CACHE: OnceLock<Arc<ContainerNameCache>> = OnceLock::new();

/// Running containers, queried once and then frozen.
///
/// The first `lookup()` runs `docker ps`; its result is kept for the rest of
/// the process lifetime, so containers started or stopped afterwards are not
/// reflected. A failed query caches an empty map and is never retried.
#[derive(Debug)]
pub struct ContainerNameCache {
    entries: OnceLock<HashMap<String, String>>,
    program: String,
    args: Vec<String>,
}

impl Default for ContainerNameCache {
    fn default() -> Self {
        Self::with_command(DOCKER, DOCKER_PS_ARGS)
    }
}

impl ContainerNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache filled from `program args` instead of `docker ps`
    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            entries: OnceLock::new(),
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Process-wide cache shared by every resolver
    pub fn global() -> Arc<ContainerNameCache> {
        Arc::clone(GLOBAL_CACHE.get_or_init(|| Arc::new(ContainerNameCache::new())))
    }

    /// Cache that is already populated and never runs docker
    #[cfg(test)]
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        let cache = Self::new();
        let _ = cache.entries.set(entries);
        cache
    }

    pub fn lookup(&self) -> &HashMap<String, String> {
        self.entries.get_or_init(|| self.query_running_containers())
    }

    pub fn container_count(&self) -> usize {
        self.lookup().len()
    }

    fn query_running_containers(&self) -> HashMap<String, String> {
        let program = self.program.as_str();
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();

        let output = match command::run_tool(program, &args, command::TOOL_TIMEOUT) {
            Ok(output) if output.success => output,
            Ok(output) => {
                log::debug!("{} exited with {:?}, no container names", program, output.exit_code);
                return HashMap::new();
            }
            Err(ToolError::Unavailable(_)) => {
                log::debug!("{} not installed, no container names", program);
                return HashMap::new();
            }
            Err(e) => {
                log::warn!("container listing failed: {}", e);
                return HashMap::new();
            }
        };

        let containers = parse_container_listing(&output.stdout);
        log::debug!("Cached {} running container name(s)", containers.len());
        containers
    }
}

/// Parse `id name` lines. The name is everything after the first run of
/// whitespace; lines without a name are ignored.
pub fn parse_container_listing(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (id, name) = line.trim().split_once(char::is_whitespace)?;
            let name = name.trim();
            (!id.is_empty() && !name.is_empty()).then(|| (id.to_string(), name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let parsed = parse_container_listing("3f2a9c1b7d4e web-frontend\na1b2c3d4e5f6 postgres\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["3f2a9c1b7d4e"], "web-frontend");
        assert_eq!(parsed["a1b2c3d4e5f6"], "postgres");
    }

    #[test]
    fn test_parse_listing_skips_malformed_lines() {
        let parsed = parse_container_listing("\nlonelyid\n  abc123   spaced name  \n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["abc123"], "spaced name");
    }

    #[test]
    fn test_seeded_cache_is_used_as_is() {
        let mut entries = HashMap::new();
        entries.insert("deadbeef".to_string(), "redis".to_string());
        let cache = ContainerNameCache::with_entries(entries);
        assert_eq!(cache.container_count(), 1);
        assert_eq!(cache.lookup()["deadbeef"], "redis");
    }

    #[test]
    fn test_lookup_is_memoized() {
        let cache = ContainerNameCache::with_command("sh", &["-c", "echo abc123 web"]);
        let first = cache.lookup() as *const HashMap<String, String>;
        let second = cache.lookup() as *const HashMap<String, String>;
        assert_eq!(first, second);
        assert_eq!(cache.lookup()["abc123"], "web");
    }

    #[test]
    fn test_missing_docker_gives_empty_map() {
        let cache = ContainerNameCache::with_command("netshow-no-such-docker", &["ps"]);
        assert!(cache.lookup().is_empty());
        assert_eq!(cache.container_count(), 0);
    }

    #[test]
    fn test_failed_listing_is_cached_and_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("runs");
        let marker_arg = marker.to_str().unwrap();
        let cache = ContainerNameCache::with_command(
            "sh",
            &["-c", "echo run >> \"$1\"; echo abc123 web; exit 1", "sh", marker_arg],
        );

        assert!(cache.lookup().is_empty());
        assert!(cache.lookup().is_empty());

        let runs = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(runs.lines().count(), 1);
    }

    #[test]
    fn test_global_cache_is_shared() {
        assert!(Arc::ptr_eq(&ContainerNameCache::global(), &ContainerNameCache::global()));
    }
}
