//! Linux backend: `/proc` directory scan plus `/proc/<pid>/stat` parsing.

use std::fs;
use std::io;
use std::time::UNIX_EPOCH;

use lazy_static::lazy_static;

use crate::pid::Pid;
use crate::process::Snapshot;

lazy_static! {
    /// The number of clock ticks per second; a kernel constant fixed at
    /// compile-time, used to convert `utime`/`stime` ticks to
    /// milliseconds.
    // SAFETY: inherently unsafe as a syscall, but the parameter is valid.
    static ref CLOCK_TICKS: i64 = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
}

/// An iterator over the whitespace/parenthesis-delimited fields of a
/// `/proc/<pid>/stat` file.
///
/// The second field (`comm`) is an arbitrary string that may itself
/// contain whitespace and parentheses, which rules out a plain
/// `str::split_whitespace`; this walks the string by hand instead,
/// locating `comm`'s closing paren from the *end* of the line (the
/// kernel guarantees the last `)` in the line terminates it).
struct StatFields<'s> {
    data: &'s str,
    idx: usize,
    state: FieldState,
}

#[derive(PartialEq)]
enum FieldState {
    /// Next field is the PID (field 1).
    Pid,
    /// Next field is `comm` (field 2).
    Command,
    /// Remaining fields are plain whitespace-separated tokens.
    Normal,
}

impl<'s> StatFields<'s> {
    fn new(data: &'s str) -> Self {
        Self {
            data,
            idx: 0,
            state: FieldState::Pid,
        }
    }
}

impl<'a> Iterator for StatFields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == FieldState::Command {
            let idx = self.data.rfind(')')?;
            self.idx += 1; // skip the opening paren
            let res = &self.data[self.idx..idx];
            self.state = FieldState::Normal;
            self.idx = idx + 2; // past ") "
            Some(res)
        } else {
            if self.state == FieldState::Pid {
                self.state = FieldState::Command;
            }
            let idx = self.idx + self.data[self.idx..].find(char::is_whitespace)?;
            let res = &self.data[self.idx..idx];
            self.idx = idx + 1;
            Some(res)
        }
    }
}

/// Field indices (0-based) into the vector produced by `StatFields`,
/// named after their 1-based position in `man 5 proc`.
const FIELD_STATE: usize = 2; // field 3
const FIELD_PPID: usize = 3; // field 4
const FIELD_UTIME: usize = 13; // field 14
const FIELD_STIME: usize = 14; // field 15
const MIN_FIELDS: usize = FIELD_STIME + 1;

fn is_viable_state(state: &str) -> bool {
    let mut chars = state.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.is_ascii_alphabetic() && !matches!(c, 'Z' | 'X' | 'x'),
        _ => false,
    }
}

fn parse_snapshot(pid: Pid, stat: &str, want_command: bool) -> Option<Snapshot> {
    let fields: Vec<&str> = StatFields::new(stat).collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    if !is_viable_state(fields[FIELD_STATE]) {
        return None;
    }

    let ppid: u32 = fields[FIELD_PPID].parse().ok()?;
    if ppid == 0 {
        return None;
    }

    let ticks: u64 = fields[FIELD_UTIME].parse::<u64>().unwrap_or(0)
        + fields[FIELD_STIME].parse::<u64>().unwrap_or(0);
    let ticks_per_sec = (*CLOCK_TICKS).max(1) as u64;
    let cumulative_cpu_time_ms = ticks.saturating_mul(1000) / ticks_per_sec;

    let command = if want_command {
        read_argv0(pid)
    } else {
        None
    };

    Some(Snapshot {
        pid,
        ppid: Pid::from(ppid),
        cumulative_cpu_time_ms,
        command,
    })
}

fn read_argv0(pid: Pid) -> Option<String> {
    let raw = fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let first = raw.split(|&b| b == 0).next()?;
    if first.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(first).into_owned())
}

pub(crate) fn snapshot_one(pid: Pid, want_command: bool) -> Option<Snapshot> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_snapshot(pid, &stat, want_command)
}

pub(crate) fn snapshot_all(want_command: bool) -> io::Result<Vec<Snapshot>> {
    let entries = fs::read_dir("/proc")?;
    let mut out = Vec::new();

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Ok(pid) = name.parse::<u32>() else {
            continue;
        };
        if let Some(snapshot) = snapshot_one(Pid::from(pid), want_command) {
            out.push(snapshot);
        }
    }

    Ok(out)
}

/// The process's start time, as milliseconds since the epoch, derived
/// from `/proc/<pid>`'s mtime (the directory is created when the
/// process is, and the kernel never updates it afterward). Used only to
/// defend the ancestry walk against PID reuse; see `process::
/// is_descendant_of`.
pub(crate) fn start_time(pid: Pid) -> Option<u64> {
    let meta = fs::metadata(format!("/proc/{pid}")).ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_stat_line() {
        let stat = "128377 (cat) R 127912 128377 127912 34817 128377 4194304 90 0 0 0 0 0 0 0 25 5 1 0 7545849 18751488 252 18446744073709551615 94742542643200 94742542658614 140726597052192 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 94742542670560 94742542671976 94742570721280 140726597055035 140726597055055 140726597055055 140726597058539 0\n";
        let fields: Vec<&str> = StatFields::new(stat).collect();
        assert_eq!(fields[0], "128377");
        assert_eq!(fields[1], "cat");
        assert_eq!(fields[FIELD_STATE], "R");
        assert_eq!(fields[FIELD_PPID], "127912");
    }

    #[test]
    fn command_name_containing_parens_and_spaces() {
        let stat = "144650 (evil program x) name!) S 120869 144650 120869 34819 144650 4194304 94 0 0 0 0 0 0 0 15 -5 1 0 8684651 18751488 274 18446744073709551615 94787199291392 94787199306806 140721558631744 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0 94787199318752 94787199320168 94787216977920 140721558639669 140721558639689 140721558639689 140721558642667 42\n";
        let fields: Vec<&str> = StatFields::new(stat).collect();
        assert_eq!(fields[0], "144650");
        assert_eq!(fields[1], "evil program x) name!");
        assert_eq!(fields[FIELD_STATE], "S");
        assert_eq!(fields[FIELD_PPID], "120869");
    }

    #[test]
    fn rejects_zombie_state() {
        assert!(!is_viable_state("Z"));
        assert!(!is_viable_state("X"));
        assert!(is_viable_state("R"));
        assert!(is_viable_state("S"));
    }

    #[test]
    fn rejects_multi_character_state() {
        assert!(!is_viable_state("RS"));
    }

    #[test]
    fn reads_own_stat_file() {
        let pid = Pid::from(std::process::id());
        let snapshot = snapshot_one(pid, false).expect("self is always readable");
        assert_eq!(snapshot.pid, pid);
        assert!(snapshot.ppid.get() > 0);
    }

    #[test]
    fn enumerates_at_least_the_current_process() {
        let pid = Pid::from(std::process::id());
        let all = snapshot_all(false).expect("/proc must be readable in tests");
        assert!(all.iter().any(|s| s.pid == pid));
    }
}
