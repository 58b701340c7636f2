// Backend definitions: connection sources, process lookups, interface counters

pub mod command;
pub mod connections;
pub mod interfaces;
pub mod process;

use serde::Serialize;
use std::fmt;

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (external tool parsing)
    Best = 4, // Native kernel tables
}

/// Which acquisition strategy produced a record set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Privileged,
    Fallback,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Privileged => f.write_str("procfs (root)"),
            SourceKind::Fallback => f.write_str("lsof"),
        }
    }
}
