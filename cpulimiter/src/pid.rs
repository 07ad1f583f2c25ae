//! Handle processes described by their PID.

use std::fmt::Display;
use std::io;
use std::str::FromStr;

/// A process identifier.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Debug)]
pub struct Pid(u32);

/// The PID of the `init` (or equivalent PID-1) process.
pub(crate) const INIT: Pid = Pid(1);

impl FromStr for Pid {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Pid(s.parse::<u32>()?))
    }
}

impl TryFrom<&str> for Pid {
    type Error = core::num::ParseIntError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Pid::from_str(value)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl From<Pid> for u32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Pid {
    /// The raw numeric value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// The job-control signals this crate emits.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug)]
pub enum Signal {
    /// Pause the process in its current state.
    SIGSTOP,
    /// Resume the process execution.
    SIGCONT,
    /// Ask the process to terminate.
    SIGTERM,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::SIGSTOP => libc::SIGSTOP,
            Signal::SIGCONT => libc::SIGCONT,
            Signal::SIGTERM => libc::SIGTERM,
        }
    }
}

/// Sends `signal` to `pid`.
///
/// Returns the originating `io::Error` on failure so callers can
/// distinguish "process vanished" (`ESRCH`) from "no permission"
/// (`EPERM`) and react accordingly, per `spec.md` §4.F's signal send
/// semantics.
pub fn kill(pid: Pid, signal: Signal) -> io::Result<()> {
    kill_raw(pid, signal.as_raw())
}

/// Probes whether `pid` exists and is reachable, without signalling it.
///
/// `kill(pid, 0)` is the POSIX-sanctioned way to test for a process's
/// existence and our permission to signal it; see `finder::find_by_pid`.
pub fn probe(pid: Pid) -> io::Result<()> {
    kill_raw(pid, 0)
}

/// The kernel's configured upper bound on PID values, where the
/// platform exposes one.
///
/// On Linux this reads `/proc/sys/kernel/pid_max`; `spec.md` §6 names
/// this file as the input-validation source for a user-supplied `--pid`.
/// Other platforms have no equivalent file, so callers fall back to
/// `u32::MAX` (in practice, `kill`'s own `ESRCH`/`EINVAL` already reject
/// out-of-range values at probe time).
#[must_use]
pub fn max_pid() -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/pid_max")
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn kill_raw(pid: Pid, raw_signal: libc::c_int) -> io::Result<()> {
    // SAFETY: `pid` and `raw_signal` are plain integers; `libc::kill`
    // never dereferences a pointer, and a `0` signal number is valid and
    // means "existence probe" per `kill(2)`.
    let rc = unsafe { libc::kill(pid.get() as libc::pid_t, raw_signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_pid() {
        assert_eq!("1234".parse::<Pid>().unwrap(), Pid::from(1234));
    }

    #[test]
    fn rejects_non_numeric_pid() {
        assert!("not-a-pid".parse::<Pid>().is_err());
    }

    #[test]
    fn probe_self_succeeds() {
        let me = Pid::from(std::process::id());
        assert!(probe(me).is_ok());
    }

    #[test]
    fn probe_nonexistent_pid_reports_a_recognized_errno() {
        let bogus = Pid::from(u32::MAX - 1);
        if let Err(e) = probe(bogus) {
            assert!(matches!(
                e.raw_os_error(),
                Some(libc::ESRCH) | Some(libc::EPERM) | Some(libc::EINVAL)
            ));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn max_pid_is_readable_and_exceeds_our_own_pid() {
        let max = max_pid().expect("/proc/sys/kernel/pid_max should be readable in tests");
        assert!(max >= std::process::id());
    }
}
