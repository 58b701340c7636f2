// lsof-based connection source
//
// Works without elevated privileges: lsof shows the caller's own sockets (and
// everyone's on platforms that allow it), which is the best we can do when
// the process table is off limits.

use super::{AcquireError, ConnectionSource};
use crate::backends::command::{self, ToolError, ToolOutput};
use crate::backends::process::ProcessTable;
use crate::backends::{BackendPriority, SourceKind};
use crate::connection::{RawConnection, TcpStatus};
use regex::Regex;
use std::sync::LazyLock;

const LSOF: &str = "lsof";

/// -n: numeric hosts, -P: numeric ports, only TCP in ESTABLISHED/LISTEN
const LSOF_ARGS: &[&str] = &["-nP", "-iTCP", "-sTCP:ESTABLISHED,LISTEN"];

/// `COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME`, where NODE is the
/// literal `TCP` and NAME is the address field.
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<proc>\S+)\s+(?P<pid>\d+)\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+TCP\s+(?P<addr>.+)$")
        .expect("lsof line pattern is valid")
});

/// Connection source that runs `lsof` and parses its table output
pub struct LsofConnectionSource {
    program: String,
}

impl LsofConnectionSource {
    pub fn new() -> Self {
        Self::with_program(LSOF)
    }

    /// Source that runs `program` with lsof's arguments
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Turn a finished lsof run into raw connections.
    ///
    /// Some platforms report a non-zero exit status even when lsof printed a
    /// perfectly good listing (e.g. when it could not inspect every process),
    /// so any output is parsed. Only a failed run with no output is empty.
    fn connections_from_output(output: &ToolOutput) -> Vec<ParsedLine> {
        if !output.success {
            if output.stdout.trim().is_empty() {
                log::debug!("lsof exited with {:?} and no output", output.exit_code);
                return Vec::new();
            }
            log::debug!(
                "lsof exited with {:?} but produced output, parsing anyway",
                output.exit_code
            );
        }
        parse_lsof_output(&output.stdout)
    }
}

impl Default for LsofConnectionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSource for LsofConnectionSource {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback // Spawns an external process and only sees what lsof sees
    }

    fn is_available() -> bool {
        command::is_tool_available(LSOF)
    }

    fn list(&self) -> Result<Vec<RawConnection>, AcquireError> {
        let output = match command::run_tool(&self.program, LSOF_ARGS, command::TOOL_TIMEOUT) {
            Ok(output) => output,
            Err(ToolError::Unavailable(_)) => {
                log::debug!(
                    "{} not installed, no connections available from fallback source",
                    self.program
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                log::warn!("{} failed: {}", self.program, e);
                return Ok(Vec::new());
            }
        };

        let parsed = Self::connections_from_output(&output);
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let processes = ProcessTable::snapshot();
        Ok(parsed
            .into_iter()
            .map(|line| {
                let command_line = processes.command_line(line.pid);
                line.into_raw(command_line)
            })
            .collect())
    }
}

/// One data line of lsof output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub process_name: String,
    pub pid: u32,
    pub local_address: String,
    pub remote_address: String,
    pub status: String,
}

impl ParsedLine {
    pub(crate) fn into_raw(self, command_line: String) -> RawConnection {
        RawConnection {
            pid: Some(self.pid),
            process_name: self.process_name,
            command_line,
            local_address: self.local_address,
            remote_address: self.remote_address,
            status: TcpStatus::parse(&self.status),
        }
    }
}

/// Parse `lsof -nP -iTCP` output. The first line is the column header and is
/// always dropped; any other line that doesn't look like a TCP entry is
/// skipped.
pub fn parse_lsof_output(output: &str) -> Vec<ParsedLine> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parsed = parse_lsof_line(line);
            if parsed.is_none() && !line.trim().is_empty() {
                log::trace!("Skipping unrecognized lsof line: {}", line);
            }
            parsed
        })
        .collect()
}

fn parse_lsof_line(line: &str) -> Option<ParsedLine> {
    let caps = LINE_PATTERN.captures(line)?;
    let pid: u32 = caps["pid"].parse().ok()?;
    let process_name = unescape_command(&caps["proc"]);

    let mut addr_field = &caps["addr"];
    let mut status = "";
    if let Some(open) = addr_field.rfind('(') {
        status = addr_field[open + 1..].trim_end_matches(')');
        addr_field = &addr_field[..open];
    }

    let (local, remote) = addr_field.split_once("->").unwrap_or((addr_field, ""));

    Some(ParsedLine {
        process_name,
        pid,
        local_address: local.trim().to_string(),
        remote_address: remote.trim().to_string(),
        status: status.to_string(),
    })
}

/// lsof prints non-printable and blank characters in the COMMAND column as
/// `\xNN`; decode them so `Code\x20H` becomes `Code H`.
pub fn unescape_command(name: &str) -> String {
    if !name.contains("\\x") {
        return name.to_string();
    }

    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            if let Some(byte) = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
