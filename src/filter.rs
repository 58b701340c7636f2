// Connection filtering and sorting

use crate::connection::ConnectionRecord;
use clap::ValueEnum;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the filter text is matched, decided once per text change
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Empty filter text
    Everything,
    /// Case-insensitive regex
    Pattern(Regex),
    /// Text that isn't a valid regex, matched as a lowercase substring
    Literal(String),
}

impl Matcher {
    pub fn new(text: &str) -> Self {
        if text.is_empty() {
            return Matcher::Everything;
        }

        match RegexBuilder::new(text).case_insensitive(true).build() {
            Ok(regex) => Matcher::Pattern(regex),
            Err(e) => {
                log::debug!("Filter {:?} is not a valid regex ({}), matching as text", text, e);
                Matcher::Literal(text.to_lowercase())
            }
        }
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Everything => true,
            Matcher::Pattern(regex) => regex.is_match(haystack),
            Matcher::Literal(needle) => haystack.to_lowercase().contains(needle.as_str()),
        }
    }

    /// A record passes if any displayed field matches
    pub fn matches_record(&self, record: &ConnectionRecord) -> bool {
        if matches!(self, Matcher::Everything) {
            return true;
        }

        [
            record.friendly_name.as_str(),
            record.process_name.as_str(),
            record.local_address.as_str(),
            record.remote_address.as_str(),
            record.status.as_str(),
        ]
        .iter()
        .any(|field| self.is_match(field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Acquisition order
    #[default]
    Default,
    /// By raw status string
    Status,
    /// By friendly name, ignoring case
    Process,
}

impl SortMode {
    /// Result of pressing the key for `requested`: selecting the active mode
    /// again goes back to default order
    pub fn toggled(self, requested: SortMode) -> SortMode {
        if self == requested {
            SortMode::Default
        } else {
            requested
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortMode::Default => "default",
            SortMode::Status => "status",
            SortMode::Process => "process",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current filter text, its compiled matcher, and the sort mode
#[derive(Debug, Clone)]
pub struct FilterState {
    text: String,
    matcher: Matcher,
    sort: SortMode,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new("", SortMode::Default)
    }
}

impl FilterState {
    pub fn new(text: &str, sort: SortMode) -> Self {
        Self {
            text: text.to_string(),
            matcher: Matcher::new(text),
            sort,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Replace the filter text. Returns false if nothing changed.
    pub fn set_text(&mut self, text: &str) -> bool {
        if text == self.text {
            return false;
        }
        self.text = text.to_string();
        self.matcher = Matcher::new(text);
        true
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
    }
}

/// Filter then sort. Sorting is stable, so equal keys keep acquisition order.
pub fn apply(records: &[ConnectionRecord], state: &FilterState) -> Vec<ConnectionRecord> {
    let mut filtered: Vec<ConnectionRecord> = records
        .iter()
        .filter(|record| state.matcher.matches_record(record))
        .cloned()
        .collect();

    match state.sort {
        SortMode::Default => {}
        SortMode::Status => filtered.sort_by(|a, b| a.status.as_str().cmp(b.status.as_str())),
        SortMode::Process => filtered.sort_by_cached_key(|record| record.friendly_name.to_lowercase()),
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{RawConnection, TcpStatus};

    fn record(friendly: &str, process: &str, local: &str, remote: &str, status: TcpStatus) -> ConnectionRecord {
        ConnectionRecord::new(
            RawConnection {
                pid: Some(100),
                process_name: process.to_string(),
                command_line: String::new(),
                local_address: local.to_string(),
                remote_address: remote.to_string(),
                status,
            },
            friendly.to_string(),
        )
    }

    fn sample() -> Vec<ConnectionRecord> {
        vec![
            record("nginx", "nginx", "0.0.0.0:80", "", TcpStatus::Listen),
            record("Tailscale", "IPNExtension", "10.0.0.2:41641", "100.64.0.1:443", TcpStatus::Established),
            record("firefox", "firefox", "192.168.1.5:50000", "93.184.216.34:443", TcpStatus::TimeWait),
            record("Docker Desktop", "com.docker.backend", "127.0.0.1:2375", "", TcpStatus::Listen),
        ]
    }

    fn names(records: &[ConnectionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.friendly_name.as_str()).collect()
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let records = sample();
        let result = apply(&records, &FilterState::default());
        assert_eq!(result, records);
    }

    #[test]
    fn test_regex_is_case_insensitive() {
        let state = FilterState::new("^NGI", SortMode::Default);
        assert_eq!(names(&apply(&sample(), &state)), vec!["nginx"]);
    }

    #[test]
    fn test_filter_checks_every_field() {
        let records = sample();
        let by_process = FilterState::new("ipnext", SortMode::Default);
        assert_eq!(names(&apply(&records, &by_process)), vec!["Tailscale"]);

        let by_remote = FilterState::new("93\\.184", SortMode::Default);
        assert_eq!(names(&apply(&records, &by_remote)), vec!["firefox"]);

        let by_local = FilterState::new(":2375", SortMode::Default);
        assert_eq!(names(&apply(&records, &by_local)), vec!["Docker Desktop"]);

        let by_status = FilterState::new("time_wait", SortMode::Default);
        assert_eq!(names(&apply(&records, &by_status)), vec!["firefox"]);
    }

    #[test]
    fn test_invalid_regex_falls_back_to_substring() {
        let records = vec![
            record("weird(app", "weird(app", "127.0.0.1:1", "", TcpStatus::Listen),
            record("other", "other", "127.0.0.1:2", "", TcpStatus::Listen),
        ];
        let state = FilterState::new("(", SortMode::Default);
        assert!(matches!(state.matcher(), Matcher::Literal(_)));
        assert_eq!(names(&apply(&records, &state)), vec!["weird(app"]);

        let upper = FilterState::new("WEIRD(", SortMode::Default);
        assert_eq!(names(&apply(&records, &upper)), vec!["weird(app"]);
    }

    #[test]
    fn test_status_sort_is_stable_and_idempotent() {
        let state = FilterState::new("", SortMode::Status);
        let once = apply(&sample(), &state);
        assert_eq!(
            names(&once),
            vec!["Tailscale", "nginx", "Docker Desktop", "firefox"]
        );
        let twice = apply(&once, &state);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_process_sort_ignores_case() {
        let state = FilterState::new("", SortMode::Process);
        assert_eq!(
            names(&apply(&sample(), &state)),
            vec!["Docker Desktop", "firefox", "nginx", "Tailscale"]
        );
    }

    #[test]
    fn test_default_sort_keeps_order() {
        let records = sample();
        let state = FilterState::new("", SortMode::Default);
        assert_eq!(names(&apply(&records, &state)), names(&records));
    }

    #[test]
    fn test_sort_toggle() {
        assert_eq!(SortMode::Default.toggled(SortMode::Status), SortMode::Status);
        assert_eq!(SortMode::Status.toggled(SortMode::Status), SortMode::Default);
        assert_eq!(SortMode::Status.toggled(SortMode::Process), SortMode::Process);
    }

    #[test]
    fn test_set_text_reports_change() {
        let mut state = FilterState::default();
        assert!(state.set_text("ssh"));
        assert!(!state.set_text("ssh"));
        assert_eq!(state.text(), "ssh");
        assert!(matches!(state.matcher(), Matcher::Pattern(_)));
        assert!(state.set_text(""));
        assert!(matches!(state.matcher(), Matcher::Everything));
    }

    #[test]
    fn test_sort_mode_serde() {
        assert_eq!(serde_json::to_string(&SortMode::Process).unwrap(), "\"process\"");
        let parsed: SortMode = serde_json::from_str("\"status\"").unwrap();
        assert_eq!(parsed, SortMode::Status);
    }
}
