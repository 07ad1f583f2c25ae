//! Locating a target process by PID or by executable name, per
//! `spec.md` §4.G.
//!
//! Both operations share one return convention: a positive PID on a
//! clean hit, `0` when nothing matches, and the negated PID when a
//! match exists but is not signallable by this process. Folding
//! "found but forbidden" into the return value, rather than a separate
//! `Result` variant, is what lets `harness::locate_then_limit` treat a
//! permission miss and a not-found miss almost identically — only the
//! exit code differs, and that distinction lives in the harness, not
//! here.

use crate::pid::{self, Pid};
use crate::process::{self, Filter};

/// Probes `pid` for existence and signallability.
///
/// Returns `0` for `pid <= 1` without ever issuing a syscall — PID 1 is
/// never a legitimate limiter target, and PID 0 means "no PID" in every
/// caller of this function.
#[must_use]
pub fn find_by_pid(target: Pid) -> i64 {
    if target.get() <= 1 {
        return 0;
    }
    match pid::probe(target) {
        Ok(()) => i64::from(target.get()),
        Err(e) if e.raw_os_error() == Some(libc::EPERM) => -i64::from(target.get()),
        Err(_) => 0,
    }
}

/// The comparison key for a command string: the whole string for an
/// absolute path, otherwise its final path component.
fn key(s: &str) -> &str {
    if s.starts_with('/') {
        s
    } else {
        s.rsplit('/').next().unwrap_or(s)
    }
}

/// Locates a running process by executable name or absolute path.
///
/// Among every live process whose resolved command matches `name`
/// under `key`, the *ancestor-most* candidate wins: walking the match
/// list, a new match replaces the current best whenever there is no
/// best yet or the new match is an ancestor of it. This is a heuristic
/// for picking the root of a spawned tree when several instances share
/// a name, not a total order — see `spec.md`'s Design Notes on this
/// point.
#[must_use]
pub fn find_by_name(name: &str) -> i64 {
    if name.is_empty() {
        return 0;
    }
    let wanted = key(name);

    let filter = Filter {
        pid: 0,
        include_descendants: false,
        want_command: true,
    };
    let iter = match process::open_iterator(filter) {
        Ok(iter) => iter,
        Err(_) => return 0,
    };

    let mut best: Option<Pid> = None;
    for snapshot in iter {
        let Some(command) = snapshot.command.as_deref() else {
            continue;
        };
        if key(command) != wanted {
            continue;
        }
        best = match best {
            None => Some(snapshot.pid),
            Some(current_best) => {
                if process::is_descendant_of(current_best, snapshot.pid) {
                    Some(snapshot.pid)
                } else {
                    Some(current_best)
                }
            }
        };
    }

    match best {
        None => 0,
        Some(candidate) => find_by_pid(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_of_absolute_path_is_the_whole_path() {
        assert_eq!(key("/usr/bin/foo"), "/usr/bin/foo");
    }

    #[test]
    fn key_of_bare_name_is_itself() {
        assert_eq!(key("foo"), "foo");
    }

    #[test]
    fn find_by_pid_rejects_pid_one_and_zero() {
        assert_eq!(find_by_pid(Pid::from(0)), 0);
        assert_eq!(find_by_pid(Pid::from(1)), 0);
    }

    #[test]
    fn find_by_pid_finds_self() {
        let me = Pid::from(std::process::id());
        assert_eq!(find_by_pid(me), i64::from(me.get()));
    }

    #[test]
    fn find_by_pid_reports_zero_for_a_bogus_pid() {
        let bogus = Pid::from(u32::MAX - 4);
        assert_eq!(find_by_pid(bogus), 0);
    }

    #[test]
    fn find_by_name_on_empty_name_is_zero() {
        assert_eq!(find_by_name(""), 0);
    }

    #[test]
    fn find_by_name_on_a_name_nothing_runs_as_is_zero() {
        assert_eq!(find_by_name("definitely-not-a-real-binary-name-xyz"), 0);
    }
}
